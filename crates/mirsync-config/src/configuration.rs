//! A named sync item description

use crate::{Connection, ConnectionType, SecretStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source/destination pair mirrored by one sync item
///
/// The identifier is assigned at construction and only changed by
/// [`ConfigurationManager::update`](crate::ConfigurationManager::update).
/// Equality ignores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    id: Uuid,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Watched endpoint, always local
    pub source: Connection,
    /// Mirrored endpoint
    pub destination: Connection,
}

impl Configuration {
    /// Create a configuration with a fresh identifier
    pub fn new(name: impl Into<String>, source: Connection, destination: Connection) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source,
            destination,
        }
    }

    /// Stable identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    /// Kind of source endpoint
    pub fn source_type(&self) -> ConnectionType {
        self.source.connection_type()
    }

    /// Kind of destination endpoint
    pub fn destination_type(&self) -> ConnectionType {
        self.destination.connection_type()
    }

    /// Every mutable piece of the configuration except its identifier
    pub fn same_settings(&self, other: &Self) -> bool {
        self.name == other.name && self.source == other.source && self.destination == other.destination
    }

    /// Drop the credentials both endpoints keep in `secrets`
    pub fn forget_secrets(&self, secrets: &dyn SecretStore) -> crate::ConfigResult<()> {
        self.source.forget_secret(secrets)?;
        self.destination.forget_secret(secrets)
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.same_settings(other)
    }
}

impl Eq for Configuration {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids() {
        let a = Configuration::new("docs", Connection::local("/a"), Connection::local("/b"));
        let b = Configuration::new("docs", Connection::local("/a"), Connection::local("/b"));
        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
    }

    #[test]
    fn test_yaml_round_trip_keeps_id() {
        let config = Configuration::new("docs", Connection::local("/a"), Connection::local("/b"));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("type: local"));

        let decoded: Configuration = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(decoded.id(), config.id());
        assert_eq!(decoded.source_type(), ConnectionType::Local);
    }
}
