//! Target hosts and their drives, read from the `;`-separated inventory CSV.
//!
//! Columns by position: `server;address;drive_type;drive_name[;user[;port]]`.
//! The first line is a header. Rows that share server and address describe
//! drives of the same host.

use std::io::Read;
use std::path::Path;

use log::warn;
use serde::Serialize;

use crate::config::parse_port;
use crate::error::ConfigError;
use crate::health::DriveClass;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveSpec {
    pub class: DriveClass,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    pub name: String,
    pub address: String,
    /// Per-host overrides of the env file's ESXI_USER / ESXI_PORT.
    pub user: Option<String>,
    pub port: Option<u16>,
    pub drives: Vec<DriveSpec>,
}

impl Host {
    /// `name (address)`, the heading a host gets in logs and the report.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.address)
    }
}

pub fn load_hosts<P: AsRef<Path>>(path: P) -> Result<Vec<Host>, ConfigError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            what: "CSV file",
            path: path.to_path_buf(),
        });
    }
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_hosts(file)
}

pub fn parse_hosts<R: Read>(input: R) -> Result<Vec<Host>, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut hosts: Vec<Host> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() < 4 {
            return Err(ConfigError::Row {
                line,
                reason: format!("expected at least 4 columns, found {}", record.len()),
            });
        }

        let field = |i: usize| record.get(i).unwrap_or("").to_string();
        let (name, address, drive_name) = (field(0), field(1), field(3));
        for (column, value) in [("server", &name), ("address", &address), ("drive_name", &drive_name)] {
            if value.is_empty() {
                return Err(ConfigError::Row {
                    line,
                    reason: format!("empty {column} column"),
                });
            }
        }
        let class = field(2)
            .parse::<DriveClass>()
            .map_err(|value| ConfigError::UnsupportedDriveType { line, value })?;
        let user = Some(field(4)).filter(|u| !u.is_empty());
        let port = match record.get(5).filter(|p| !p.is_empty()) {
            None => None,
            Some(raw) => Some(parse_port(raw).ok_or_else(|| ConfigError::Row {
                line,
                reason: format!("invalid port '{raw}'"),
            })?),
        };

        let drive = DriveSpec { class, name: drive_name };
        match hosts.iter().position(|h| h.name == name && h.address == address) {
            Some(index) => {
                let host = &mut hosts[index];
                if (user.is_some() && user != host.user) || (port.is_some() && port != host.port) {
                    warn!(
                        "CSV line {line}: overrides for {} differ from its first row; keeping the first",
                        host.label()
                    );
                }
                host.drives.push(drive);
            }
            None => hosts.push(Host {
                name,
                address,
                user,
                port,
                drives: vec![drive],
            }),
        }
    }

    if hosts.is_empty() {
        return Err(ConfigError::NoHosts);
    }
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = "\
server;address;drive_type;drive_name
esx01;10.0.0.11;NVME;vmhba2
esx01;10.0.0.11;DISK;t10.ATA_WDC_WD40EFRX
esx02;10.0.0.12;SATA;t10.ATA_Samsung_SSD_860;monitor;2222
esx01;10.0.0.11;SATA;t10.ATA_Crucial_MX500
";

    #[test]
    fn groups_rows_by_host_in_first_appearance_order() {
        let hosts = parse_hosts(INVENTORY.as_bytes()).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].label(), "esx01 (10.0.0.11)");
        assert_eq!(hosts[0].drives.len(), 3);
        assert_eq!(hosts[0].drives[1].class, DriveClass::Hdd);
        assert_eq!(hosts[0].drives[2].name, "t10.ATA_Crucial_MX500");
        assert_eq!(hosts[1].user.as_deref(), Some("monitor"));
        assert_eq!(hosts[1].port, Some(2222));
        assert_eq!(hosts[0].user, None);
    }

    #[test]
    fn rejects_unknown_drive_type() {
        let input = "server;address;drive_type;drive_name\nesx01;10.0.0.11;SCSI;naa.600\n";
        let err = parse_hosts(input.as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedDriveType { line: 2, .. }));
    }

    #[test]
    fn rejects_short_rows() {
        let input = "server;address;drive_type;drive_name\nesx01;10.0.0.11;NVME\n";
        let err = parse_hosts(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("at least 4 columns"));
    }

    #[test]
    fn rejects_bad_port_override() {
        let input = "server;address;drive_type;drive_name;user;port\nesx01;10.0.0.11;NVME;vmhba2;;ssh\n";
        let err = parse_hosts(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid port 'ssh'"));
    }

    #[test]
    fn header_only_is_an_error() {
        let err = parse_hosts("server;address;drive_type;drive_name\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::NoHosts));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_hosts("/nonexistent/hosts.csv").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { what: "CSV file", .. }));
    }
}
