use std::path::Path;

use minijinja::{Environment, context};
use serde::Serialize;

use crate::error::{ConfigError, ReportError};
use crate::health::DriveRecord;
use crate::inventory::Host;

pub const NO_DATA: &str = "no data";

/// Everything collected for one host. A host without records stays in the
/// report so outages remain visible.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: Host,
    pub drives: Vec<DriveRecord>,
    pub error: Option<String>,
}

impl HostReport {
    pub fn status(&self) -> &'static str {
        if self.drives.is_empty() { NO_DATA } else { "OK" }
    }
}

/// Report-wide template variables.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub org: String,
    pub date: String,
    pub reporter: String,
}

#[derive(Serialize)]
struct ServerView<'a> {
    name: &'a str,
    address: &'a str,
    label: String,
    status: &'static str,
    error: Option<&'a str>,
    drives: &'a [DriveRecord],
}

impl<'a> From<&'a HostReport> for ServerView<'a> {
    fn from(report: &'a HostReport) -> Self {
        ServerView {
            name: &report.host.name,
            address: &report.host.address,
            label: report.host.label(),
            status: report.status(),
            error: report.error.as_deref(),
            drives: &report.drives,
        }
    }
}

/// A user-supplied Jinja-style report template, syntax-checked on load.
#[derive(Debug, Clone)]
pub struct ReportTemplate {
    source: String,
}

impl ReportTemplate {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                what: "report template",
                path: path.to_path_buf(),
            });
        }
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_source(source)
    }

    pub fn from_source(source: String) -> Result<Self, ConfigError> {
        let env = Environment::new();
        env.template_from_str(&source).map_err(ConfigError::Template)?;
        Ok(ReportTemplate { source })
    }

    pub fn render(&self, meta: &ReportMeta, hosts: &[HostReport]) -> Result<String, ReportError> {
        let env = Environment::new();
        let template = env.template_from_str(&self.source)?;
        let servers: Vec<ServerView<'_>> = hosts.iter().map(ServerView::from).collect();
        let rendered = template.render(context! {
            org => &meta.org,
            date => &meta.date,
            reporter => &meta.reporter,
            servers => servers,
        })?;
        Ok(rendered)
    }
}
