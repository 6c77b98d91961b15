use log::debug;

use super::{DriveClass, DriveRecord, MetricValue, leading_int, leading_number};
use crate::error::ParseError;

/// Parses `esxcli nvme device log smart get` output (`Key: value` lines).
pub(super) fn parse(host: &str, drive: &str, output: &str) -> Result<DriveRecord, ParseError> {
    let mut record = DriveRecord::new(host, drive, DriveClass::Nvme);
    let mut spare = None;
    let mut spare_threshold = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "NVM Subsystem Reliability Degradation" | "Volatile Memory Backup Device Failure" => {
                record.push(key, MetricValue::Text(value.to_string()));
            }
            "Composite Temperature" | "Temperature" if record.temperature.is_none() => {
                if let Some(celsius) = celsius(key, value) {
                    record.temperature = Some(celsius);
                    record.push("Drive Temperature (Celsius)", MetricValue::Integer(celsius));
                }
            }
            "Available Spare" => {
                if let Some(pct) = leading_int(value) {
                    spare = Some(pct);
                    record.push("Available Spare (%)", MetricValue::Integer(pct));
                }
            }
            "Available Spare Threshold" => {
                if let Some(pct) = leading_int(value) {
                    spare_threshold = Some(pct);
                    record.push("Available Spare Threshold (%)", MetricValue::Integer(pct));
                }
            }
            "Percentage Used" => {
                if let Some(pct) = leading_int(value) {
                    record.wear = Some(pct);
                    record.push("Percentage Used (%)", MetricValue::Integer(pct));
                }
            }
            "Power On Hours" | "Unsafe Shutdowns" | "Media Errors" | "Number of Error Info Log Entries" => {
                record.push(key, MetricValue::from_raw(value));
            }
            _ => {}
        }
    }

    if record.metrics.is_empty() {
        return Err(ParseError::Unrecognised {
            class: DriveClass::Nvme.label(),
            drive: drive.to_string(),
        });
    }

    record.health = match (spare, spare_threshold) {
        (Some(spare), Some(threshold)) if spare <= threshold => "Not OK".to_string(),
        _ => "OK".to_string(),
    };
    debug!("{host}: NVMe {drive} parsed into {} metric(s)", record.metrics.len());
    Ok(record)
}

/// ESXi reports the composite temperature in Kelvin, with or without a unit.
fn celsius(key: &str, value: &str) -> Option<i64> {
    if value.starts_with("0x") {
        return leading_int(value).map(|kelvin| kelvin - 273);
    }
    let (number, unit) = leading_number(value)?;
    let kelvin = match unit.trim_start_matches('°').chars().next() {
        Some('K' | 'k') => true,
        Some('C' | 'c') => false,
        _ => key == "Composite Temperature",
    };
    let celsius = if kelvin { number - 273.15 } else { number };
    Some(celsius.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESXCLI_SMART_LOG: &str = "\
SMART Log
   Critical Warning: 0x00
   Available Spare Space Below Threshold: false
   Temperature Above Threshold: false
   NVM Subsystem Reliability Degradation: false
   Read Only Mode: false
   Volatile Memory Backup Device Failure: false
   Composite Temperature: 311 K
   Available Spare: 100%
   Available Spare Threshold: 10%
   Percentage Used: 3%
   Data Units Read: 0x0000000000000000000000000017a2b1
   Data Units Written: 0x00000000000000000000000000113c4e
   Power On Hours: 0x00000000000000000000000000001f40
   Unsafe Shutdowns: 0x0000000000000000000000000000000c
   Media Errors: 0x00000000000000000000000000000000
   Number of Error Info Log Entries: 0x00000000000000000000000000000002
";

    #[test]
    fn extracts_celsius_temperature_and_wear() {
        let output = "Temperature: 42 C\nPercentage Used: 5%\n";
        let record = parse("esx01", "t10.NVMe____Samsung", output).unwrap();
        assert_eq!(record.temperature, Some(42));
        assert_eq!(record.wear, Some(5));
        assert_eq!(record.class, DriveClass::Nvme);
        assert_eq!(record.host, "esx01");
    }

    #[test]
    fn parses_full_esxcli_smart_log() {
        let record = parse("esx01", "vmhba2", ESXCLI_SMART_LOG).unwrap();
        assert_eq!(record.temperature, Some(38));
        assert_eq!(record.wear, Some(3));
        assert_eq!(record.health, "OK");
        assert_eq!(
            record.metric("Unsafe Shutdowns"),
            Some(&MetricValue::Integer(12))
        );
        assert_eq!(
            record.metric("Power On Hours"),
            Some(&MetricValue::Integer(8000))
        );
        assert_eq!(
            record.metric("Number of Error Info Log Entries"),
            Some(&MetricValue::Integer(2))
        );
        assert_eq!(
            record.metric("NVM Subsystem Reliability Degradation"),
            Some(&MetricValue::Text("false".into()))
        );
        assert_eq!(
            record.metric("Available Spare Threshold (%)"),
            Some(&MetricValue::Integer(10))
        );
        // "Temperature Above Threshold" must not be read as a temperature.
        assert_eq!(
            record
                .metrics
                .iter()
                .filter(|m| m.name == "Drive Temperature (Celsius)")
                .count(),
            1
        );
    }

    #[test]
    fn spare_at_threshold_is_not_ok() {
        let output = ESXCLI_SMART_LOG.replace("Available Spare: 100%", "Available Spare: 10%");
        let record = parse("esx01", "vmhba2", &output).unwrap();
        assert_eq!(record.health, "Not OK");
        assert!(!record.is_healthy());
    }

    #[test]
    fn composite_temperature_without_unit_is_kelvin() {
        let record = parse("esx01", "vmhba2", "Composite Temperature: 308\n").unwrap();
        assert_eq!(record.temperature, Some(35));
    }

    #[test]
    fn unrelated_output_is_rejected() {
        let err = parse("esx01", "vmhba2", "Error: Unable to find device vmhba2\n").unwrap_err();
        assert!(matches!(err, ParseError::Unrecognised { class: "NVME", .. }));
    }
}
