use log::debug;

use super::{DriveClass, DriveRecord, MetricValue, health_column, leading_int, raw_column};
use crate::error::ParseError;

const PARAMETERS: &[&str] = &[
    "Drive Temperature",
    "Read Error Count",
    "Reallocated Sector Count",
    "Sector Reallocation Event Count",
    "Pending Sector Reallocation Count",
    "Uncorrectable Sector Count",
    "Power-on Hours",
];

/// Parses `esxcli storage core device smart get` output for spinning disks.
pub(super) fn parse(host: &str, drive: &str, output: &str) -> Result<DriveRecord, ParseError> {
    let mut record = DriveRecord::new(host, drive, DriveClass::Hdd);
    let mut health = None;

    for line in output.lines() {
        if let Some(value) = health_column(line) {
            health = Some(value.to_string());
            continue;
        }
        for &parameter in PARAMETERS {
            let Some(value) = raw_column(line, parameter) else {
                continue;
            };
            if parameter == "Drive Temperature" {
                record.temperature = leading_int(value);
                record.push("Drive Temperature (Celsius)", MetricValue::from_raw(value));
            } else {
                record.push(parameter, MetricValue::from_raw(value));
            }
            break;
        }
    }

    if health.is_none() && record.metrics.is_empty() {
        return Err(ParseError::Unrecognised {
            class: DriveClass::Hdd.label(),
            drive: drive.to_string(),
        });
    }

    if let Some(health) = health {
        record.health = health;
    }
    debug!("{host}: HDD {drive} parsed into {} metric(s)", record.metrics.len());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WD_RED_SMART: &str = "\
Parameter                          Value  Threshold  Worst  Raw
---------------------------------  -----  ---------  -----  ---
Health Status                      OK     N/A        N/A    N/A
Media Wearout Indicator            N/A    N/A        N/A    N/A
Write Error Count                  100    0          100    0
Read Error Count                   200    51         200    0
Power-on Hours                     45     0          45     40112
Power Cycle Count                  100    0          100    88
Reallocated Sector Count           200    140        200    0
Raw Read Error Rate                200    51         200    0
Drive Temperature                  116    0          104    34
Driver Rated Max Temperature       N/A    N/A        N/A    N/A
Write Sectors TOT Count            N/A    N/A        N/A    N/A
Read Sectors TOT Count             N/A    N/A        N/A    N/A
Initial Bad Block Count            N/A    N/A        N/A    N/A
Sector Reallocation Event Count    200    0          200    0
Pending Sector Reallocation Count  200    0          200    2
Uncorrectable Sector Count         100    0          100    0
";

    #[test]
    fn parses_recorded_table() {
        let record = parse("esx03", "t10.ATA_WDC_WD40EFRX", WD_RED_SMART).unwrap();
        assert_eq!(record.class, DriveClass::Hdd);
        assert_eq!(record.health, "OK");
        assert_eq!(record.temperature, Some(34));
        assert_eq!(record.wear, None);
        assert_eq!(
            record.metric("Pending Sector Reallocation Count"),
            Some(&MetricValue::Integer(2))
        );
        assert_eq!(
            record.metric("Power-on Hours"),
            Some(&MetricValue::Integer(40112))
        );
        assert_eq!(record.metric("Media Wearout Indicator"), None);
        assert_eq!(record.metrics.len(), PARAMETERS.len());
    }

    #[test]
    fn counters_are_raw_not_normalised() {
        let output = "\
Health Status                      OK     N/A        N/A    N/A
Reallocated Sector Count           100    5          100    50
Power-on Hours                     87     0          87     11869
";
        let record = parse("esx03", "t10.ATA", output).unwrap();
        assert_eq!(
            record.metric("Reallocated Sector Count"),
            Some(&MetricValue::Integer(50))
        );
        assert_eq!(
            record.metric("Power-on Hours"),
            Some(&MetricValue::Integer(11869))
        );
    }

    #[test]
    fn similar_parameter_names_stay_separate() {
        let record = parse("esx03", "t10.ATA", WD_RED_SMART).unwrap();
        let names: Vec<_> = record.metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names
                .iter()
                .filter(|n| n.contains("Reallocat"))
                .count(),
            3
        );
        assert!(!names.contains(&"Raw Read Error Rate"));
    }

    #[test]
    fn temperature_with_unit_suffix() {
        let record = parse("esx03", "t10.ATA", "Drive Temperature   112   0   98   41C\n").unwrap();
        assert_eq!(record.temperature, Some(41));
    }

    #[test]
    fn empty_output_yields_no_record() {
        assert!(parse("esx03", "t10.ATA", "").is_err());
    }
}
