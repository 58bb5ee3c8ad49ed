//! JSON output structures for the mirsync CLI

use mirsync_config::{Configuration, Connection, SftpAuthentication};
use serde::{Deserialize, Serialize};

/// Output of `mirsync list --json`
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigurationListJson {
    /// mirsync version
    pub version: String,
    /// When the listing was produced
    pub timestamp: String,
    /// Stored configurations
    pub configurations: Vec<ConfigurationJson>,
}

/// One stored configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigurationJson {
    /// Configuration identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Watched end
    pub source: EndpointJson,
    /// Mirrored end
    pub destination: EndpointJson,
}

/// One end of a configuration, without credentials
#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointJson {
    /// `local` or `sftp`
    #[serde(rename = "type")]
    pub kind: String,
    /// Display form of the location
    pub location: String,
    /// `password` or `key` for SFTP ends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
}

impl From<&Connection> for EndpointJson {
    fn from(connection: &Connection) -> Self {
        let authentication = match connection {
            Connection::Local(_) => None,
            Connection::Sftp(sftp) => Some(match sftp.authentication() {
                SftpAuthentication::Password { .. } => "password".to_string(),
                SftpAuthentication::Key { .. } => "key".to_string(),
            }),
        };
        Self {
            kind: connection.connection_type().to_string(),
            location: connection.to_string(),
            authentication,
        }
    }
}

impl From<&Configuration> for ConfigurationJson {
    fn from(configuration: &Configuration) -> Self {
        Self {
            id: configuration.id().to_string(),
            name: configuration.name.clone(),
            source: EndpointJson::from(&configuration.source),
            destination: EndpointJson::from(&configuration.destination),
        }
    }
}

impl ConfigurationListJson {
    /// Listing of `configurations` stamped with the current time
    pub fn new(configurations: &[Configuration]) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            configurations: configurations.iter().map(ConfigurationJson::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirsync_config::{MemorySecretStore, SftpConnection};

    #[test]
    fn test_listing_never_contains_passwords() {
        let secrets = MemorySecretStore::new();
        let sftp = SftpConnection::with_password("/srv", "example.org", None, "alice", "hunter2", &secrets).unwrap();
        let configuration = Configuration::new("site", Connection::local("/src"), Connection::Sftp(sftp));

        let json = serde_json::to_string(&ConfigurationListJson::new(&[configuration])).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"authentication\":\"password\""));
        assert!(json.contains("\"type\":\"sftp\""));
    }
}
