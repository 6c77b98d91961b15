//! Drive health extraction from `esxcli` output.
//!
//! Every drive class has its own branch module. The vendor text formats have
//! little in common, so the branches only share the small value helpers below.

mod hdd;
mod nvme;
mod sata;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriveClass {
    #[serde(rename = "NVME")]
    Nvme,
    #[serde(rename = "SATA")]
    SataSsd,
    #[serde(rename = "DISK")]
    Hdd,
}

impl DriveClass {
    pub fn label(self) -> &'static str {
        match self {
            DriveClass::Nvme => "NVME",
            DriveClass::SataSsd => "SATA",
            DriveClass::Hdd => "DISK",
        }
    }
}

impl fmt::Display for DriveClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DriveClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NVME" => Ok(DriveClass::Nvme),
            "SATA" => Ok(DriveClass::SataSsd),
            "DISK" => Ok(DriveClass::Hdd),
            _ => Err(s.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Text(String),
}

impl MetricValue {
    /// Integer when the value starts with a number, text otherwise (`N/A`, `false`).
    pub fn from_raw(raw: &str) -> Self {
        match leading_int(raw) {
            Some(n) => MetricValue::Integer(n),
            None => MetricValue::Text(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

/// Health data of a single drive on a single host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveRecord {
    pub host: String,
    pub name: String,
    pub class: DriveClass,
    pub health: String,
    /// Degrees Celsius.
    pub temperature: Option<i64>,
    /// Percent of rated endurance used, when the drive reports it.
    pub wear: Option<i64>,
    pub metrics: Vec<Metric>,
}

impl DriveRecord {
    fn new(host: &str, name: &str, class: DriveClass) -> Self {
        DriveRecord {
            host: host.to_string(),
            name: name.to_string(),
            class,
            health: "Unknown".to_string(),
            temperature: None,
            wear: None,
            metrics: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, value: MetricValue) {
        self.metrics.push(Metric {
            name: name.to_string(),
            value,
        });
    }

    #[cfg(test)]
    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.iter().find(|m| m.name == name).map(|m| &m.value)
    }

    pub fn is_healthy(&self) -> bool {
        self.health.eq_ignore_ascii_case("OK")
    }
}

/// Turns the raw output of one drive's command into its record.
pub fn parse(
    class: DriveClass,
    host: &str,
    drive: &str,
    output: &str,
) -> Result<DriveRecord, ParseError> {
    match class {
        DriveClass::Nvme => nvme::parse(host, drive, output),
        DriveClass::SataSsd => sata::parse(host, drive, output),
        DriveClass::Hdd => hdd::parse(host, drive, output),
    }
}

/// Leading integer of values such as `42 C`, `5%`, ` 17 ` or `0x000a`.
fn leading_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        let digits: String = hex.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
        if digits.is_empty() {
            return None;
        }
        return u128::from_str_radix(&digits, 16)
            .ok()
            .and_then(|n| i64::try_from(n).ok());
    }

    let end = raw
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw[..end].parse().ok()
}

/// Leading decimal number and whatever unit text follows it.
fn leading_number(raw: &str) -> Option<(f64, &str)> {
    let raw = raw.trim();
    let end = raw
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    let number = raw[..end].parse().ok()?;
    Some((number, raw[end..].trim()))
}

/// Columns of an `esxcli storage core device smart get` table row, counted
/// after the parameter name: `Value Threshold Worst Raw`.
const VALUE_COLUMN: usize = 0;
const RAW_COLUMN: usize = 3;

/// One column of a table row, if the row is for `parameter` and has it.
fn column<'a>(line: &'a str, parameter: &str, index: usize) -> Option<&'a str> {
    let rest = line.trim().strip_prefix(parameter)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace().nth(index)
}

/// Health Status is the only row read from the Value column.
fn health_column(line: &str) -> Option<&str> {
    column(line, "Health Status", VALUE_COLUMN)
}

/// Metric rows report the drive's own counter in the Raw column.
fn raw_column<'a>(line: &'a str, parameter: &str) -> Option<&'a str> {
    column(line, parameter, RAW_COLUMN)
}
