use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

pub const DEFAULT_ESXI_USER: &str = "root";
pub const DEFAULT_ESXI_PORT: u16 = 22;

#[derive(Clone)]
pub struct Settings {
    pub org: String,
    pub esxi_user: String,
    pub esxi_pass: String,
    pub esxi_port: u16,
    pub mail: Option<MailSettings>, // None unless USE_SMTP=yes
}

#[derive(Clone)]
pub struct MailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub from: String,
    pub to: String, // comma-separated
    pub security: SmtpSecurity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    None,
    StartTls,
    Ssl,
}

// Passwords stay out of debug output.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("org", &self.org)
            .field("esxi_user", &self.esxi_user)
            .field("esxi_port", &self.esxi_port)
            .field("mail", &self.mail)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            what: "env file",
            path: path.to_path_buf(),
        });
    }

    // The env file holds passwords
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(path) {
            if metadata.permissions().mode() & 0o044 != 0 {
                eprintln!(
                    "[SECURITY WARNING] Env file {} is readable by group/others. Consider: chmod 600 {}",
                    path.display(),
                    path.display()
                );
            }
        }
    }

    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    apply_env_overrides(&mut vars);
    settings_from_map(&vars)
}

fn apply_env_overrides(vars: &mut HashMap<String, String>) {
    for (process_key, file_key) in [
        ("GETSMART_ESXI_PASS", "ESXI_PASS"),
        ("GETSMART_SMTP_PASS", "SMTP_PASS"),
    ] {
        if let Ok(value) = env::var(process_key) {
            if !value.trim().is_empty() {
                vars.insert(file_key.to_string(), value);
            }
        }
    }
}

pub fn settings_from_map(vars: &HashMap<String, String>) -> Result<Settings, ConfigError> {
    let mut missing_keys = Vec::new();
    let mut warnings = Vec::new();
    let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    let org = get("ORG").unwrap_or_default().to_string();
    if org.is_empty() {
        missing_keys.push("ORG".to_string());
    }
    let esxi_user = get("ESXI_USER").unwrap_or(DEFAULT_ESXI_USER).to_string();
    let esxi_pass = vars.get("ESXI_PASS").cloned().unwrap_or_default();
    if esxi_pass.is_empty() {
        missing_keys.push("ESXI_PASS".to_string());
    }
    let esxi_port = match get("ESXI_PORT") {
        None => DEFAULT_ESXI_PORT,
        Some(raw) => parse_port(raw).unwrap_or_else(|| {
            missing_keys.push("ESXI_PORT (must be 1-65535)".to_string());
            0
        }),
    };

    let mail = if get("USE_SMTP").is_some_and(|v| v.eq_ignore_ascii_case("yes")) {
        let smtp_host = get("SMTP_HOST").unwrap_or_default().to_string();
        if smtp_host.is_empty() {
            missing_keys.push("SMTP_HOST".to_string());
        }
        let smtp_port = match get("SMTP_PORT").map(parse_port) {
            Some(Some(port)) => port,
            _ => {
                missing_keys.push("SMTP_PORT (must be 1-65535)".to_string());
                0
            }
        };
        let from = get("SMTP_FROM").unwrap_or_default().to_string();
        if !from.contains('@') {
            missing_keys.push("SMTP_FROM (must be a valid email address)".to_string());
        }

        // SMTP_TO may hold several comma-separated recipients
        let to = get("SMTP_TO").unwrap_or_default().to_string();
        let recipients: Vec<&str> = to.split(',').map(str::trim).filter(|a| !a.is_empty()).collect();
        if recipients.is_empty() {
            missing_keys.push("SMTP_TO (must be a valid email address)".to_string());
        } else if recipients.iter().any(|a| !a.contains('@')) {
            missing_keys.push("SMTP_TO (one or more recipients appear invalid)".to_string());
        }

        let security = match get("SMTP_SECURITY").map(str::to_lowercase).as_deref() {
            None | Some("starttls") => SmtpSecurity::StartTls,
            Some("ssl") => SmtpSecurity::Ssl,
            Some("none") => {
                warnings.push("SMTP security is set to 'none'. This is insecure and not recommended.");
                SmtpSecurity::None
            }
            Some(_) => {
                missing_keys.push("SMTP_SECURITY (must be one of: none, starttls, ssl)".to_string());
                SmtpSecurity::StartTls
            }
        };

        Some(MailSettings {
            smtp_host,
            smtp_port,
            smtp_user: get("SMTP_USER").unwrap_or_default().to_string(),
            smtp_pass: vars.get("SMTP_PASS").cloned().unwrap_or_default(),
            from,
            to,
            security,
        })
    } else {
        warnings.push("USE_SMTP is not 'yes'. The report will be rendered but not mailed.");
        None
    };

    if !missing_keys.is_empty() {
        return Err(ConfigError::Settings(missing_keys));
    }
    if !warnings.is_empty() {
        eprintln!("[CONFIG WARNING] {}", warnings.join(" | "));
    }
    Ok(Settings {
        org,
        esxi_user,
        esxi_pass,
        esxi_port,
        mail,
    })
}

pub(crate) fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|&p| p != 0)
}
