//! SSH access to ESXi hosts.

use async_ssh2_tokio::{AuthMethod, Client, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, warn};

use crate::config::Settings;
use crate::error::ConnectionError;
use crate::health::DriveClass;
use crate::inventory::Host;

/// Raw result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: u32,
}

#[async_trait]
pub trait RemoteSession: Send {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, ConnectionError>;
    async fn close(self);
}

#[async_trait]
pub trait Connector: Sync {
    type Session: RemoteSession;

    async fn connect(&self, host: &Host) -> Result<Self::Session, ConnectionError>;
}

pub fn command_for(class: DriveClass, drive: &str) -> String {
    match class {
        DriveClass::Nvme => format!("esxcli nvme device log smart get -A {drive}"),
        DriveClass::SataSsd => format!("esxcli storage core device smart get -d {drive}"),
        DriveClass::Hdd => format!("esxcli storage core device smart get -d {drive}"),
    }
}

/// Password-authenticated SSH using the credentials from the env file.
pub struct SshConnector {
    user: String,
    password: String,
    port: u16,
}

impl SshConnector {
    pub fn new(settings: &Settings) -> Self {
        SshConnector {
            user: settings.esxi_user.clone(),
            password: settings.esxi_pass.clone(),
            port: settings.esxi_port,
        }
    }
}

pub struct SshSession {
    client: Client,
    address: String,
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, host: &Host) -> Result<SshSession, ConnectionError> {
        let user = host.user.as_deref().unwrap_or(&self.user);
        let port = host.port.unwrap_or(self.port);
        debug!("Connecting to {}:{} as {}", host.address, port, user);

        // ESXi hosts are addressed by IP and usually carry self-generated keys
        let client = Client::connect(
            (host.address.as_str(), port),
            user,
            AuthMethod::with_password(&self.password),
            ServerCheckMethod::NoCheck,
        )
        .await
        .map_err(|source| ConnectionError::Connect {
            address: host.address.clone(),
            port,
            source,
        })?;

        Ok(SshSession {
            client,
            address: host.address.clone(),
        })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, ConnectionError> {
        debug!("{}: running '{}'", self.address, command);
        let result = self
            .client
            .execute(command)
            .await
            .map_err(|source| ConnectionError::Exec {
                command: command.to_string(),
                source,
            })?;
        Ok(CommandOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_status: result.exit_status,
        })
    }

    async fn close(self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("{}: error while closing SSH session: {}", self.address, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_per_drive_class() {
        assert_eq!(
            command_for(DriveClass::Nvme, "vmhba2"),
            "esxcli nvme device log smart get -A vmhba2"
        );
        assert_eq!(
            command_for(DriveClass::SataSsd, "t10.ATA_X"),
            "esxcli storage core device smart get -d t10.ATA_X"
        );
        assert_eq!(
            command_for(DriveClass::Hdd, "t10.ATA_Y"),
            "esxcli storage core device smart get -d t10.ATA_Y"
        );
    }

    #[test]
    fn connector_takes_env_credentials() {
        let settings = Settings {
            org: "Acme".into(),
            esxi_user: "root".into(),
            esxi_pass: "secret".into(),
            esxi_port: 22,
            mail: None,
        };
        let connector = SshConnector::new(&settings);
        assert_eq!(connector.user, "root");
        assert_eq!(connector.password, "secret");
        assert_eq!(connector.port, 22);
    }
}
