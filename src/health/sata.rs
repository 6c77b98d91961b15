use log::debug;

use super::{DriveClass, DriveRecord, MetricValue, health_column, leading_int, raw_column};
use crate::error::ParseError;

const PARAMETERS: &[&str] = &[
    "Drive Temperature",
    "Media Wearout Indicator",
    "Reallocated Sector Count",
    "Write Sectors TOT Count",
    "Read Sectors TOT Count",
    "Initial Bad Block Count",
    "Program Fail Count",
    "Erase Fail Count",
    "Uncorrectable Error Count",
    "Pending Sector Reallocation Count",
    "Power-on Hours",
];

/// Parses `esxcli storage core device smart get` output for SATA SSDs.
///
/// Unverified against real SATA SSD hardware; only checked against the
/// recorded sample in the tests below.
pub(super) fn parse(host: &str, drive: &str, output: &str) -> Result<DriveRecord, ParseError> {
    let mut record = DriveRecord::new(host, drive, DriveClass::SataSsd);
    let mut health = None;

    for line in output.lines() {
        if let Some(value) = health_column(line) {
            health = Some(value.to_string());
            continue;
        }
        let Some((parameter, value)) = PARAMETERS
            .iter()
            .find_map(|&p| raw_column(line, p).map(|v| (p, v)))
        else {
            continue;
        };

        match parameter {
            "Drive Temperature" => {
                record.temperature = leading_int(value);
                record.push("Drive Temperature (Celsius)", MetricValue::from_raw(value));
            }
            "Media Wearout Indicator" => {
                record.wear = leading_int(value);
                record.push(parameter, MetricValue::from_raw(value));
            }
            _ => record.push(parameter, MetricValue::from_raw(value)),
        }
    }

    if health.is_none() && record.metrics.is_empty() {
        return Err(ParseError::Unrecognised {
            class: DriveClass::SataSsd.label(),
            drive: drive.to_string(),
        });
    }

    if let Some(health) = health {
        record.health = health;
    }
    debug!("{host}: SATA {drive} parsed into {} metric(s)", record.metrics.len());
    Ok(record)
}
