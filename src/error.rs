use std::path::PathBuf;

use thiserror::Error;

/// Problems with the inputs. Always fatal, raised before any host is contacted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{what} not found: {}", .path.display())]
    NotFound { what: &'static str, path: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse CSV file: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV line {line}: {reason}")]
    Row { line: u64, reason: String },
    #[error("CSV line {line}: unsupported drive type '{value}' (expected NVME, SATA or DISK)")]
    UnsupportedDriveType { line: u64, value: String },
    #[error("CSV file lists no hosts")]
    NoHosts,
    #[error("failed to parse env file: {0}")]
    Env(#[from] dotenvy::Error),
    #[error("missing or invalid required settings: {}", .0.join(", "))]
    Settings(Vec<String>),
    #[error("invalid report template: {0}")]
    Template(#[source] minijinja::Error),
}

/// Failure to reach a host or to run a command on it.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection to {address}:{port} failed: {source}")]
    Connect {
        address: String,
        port: u16,
        #[source]
        source: async_ssh2_tokio::Error,
    },
    #[error("command '{command}' failed: {source}")]
    Exec {
        command: String,
        #[source]
        source: async_ssh2_tokio::Error,
    },
}

/// Command output that could not be turned into a drive record.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no recognised {class} fields in output for drive {drive}")]
    Unrecognised { class: &'static str, drive: String },
    #[error("command exited with status {status} for drive {drive}: {stderr}")]
    CommandStatus {
        drive: String,
        status: u32,
        stderr: String,
    },
}

/// Why a single drive produced no record.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to render report: {0}")]
    Render(#[from] minijinja::Error),
}

/// Failure to hand the finished report to the mail server.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid {field} address '{value}': {source}")]
    Address {
        field: &'static str,
        value: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("no recipients configured")]
    NoRecipients,
    #[error("failed to build email message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP setup error: {0}")]
    Setup(#[source] lettre::transport::smtp::Error),
    #[error("SMTP worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("SMTP error after {attempts} attempt(s): {source}")]
    Send {
        attempts: u32,
        #[source]
        source: lettre::transport::smtp::Error,
    },
}
