//! CRUD front end over a configuration store and a secret store

use crate::{ConfigResult, Configuration, Connection, ConfigurationStore, SecretStore};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Keeps a cached list of configurations in step with a [`ConfigurationStore`]
///
/// Every mutation writes through to the store and then reloads the cache.
/// Loaded SFTP passwords are resolved from the [`SecretStore`]; a missing
/// secret is logged and leaves the password empty so the item can still be
/// listed and edited.
pub struct ConfigurationManager {
    store: Arc<dyn ConfigurationStore>,
    secrets: Arc<dyn SecretStore>,
    configurations: Vec<Configuration>,
}

impl ConfigurationManager {
    /// Open the manager and load every stored configuration
    pub fn new(store: Arc<dyn ConfigurationStore>, secrets: Arc<dyn SecretStore>) -> ConfigResult<Self> {
        let mut manager = Self {
            store,
            secrets,
            configurations: Vec::new(),
        };
        manager.reload()?;
        Ok(manager)
    }

    /// Cached configurations
    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    /// Cached configuration with the given id
    pub fn configuration(&self, id: Uuid) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.id() == id)
    }

    /// Secret store used to resolve passwords
    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    /// Persist a new configuration
    pub fn add(&mut self, configuration: &Configuration) -> ConfigResult<()> {
        self.store.save(configuration)?;
        info!("Added configuration {} ({})", configuration.name, configuration.id());
        self.reload()
    }

    /// Persist `configuration` under the existing identifier `id`
    pub fn update(&mut self, configuration: &mut Configuration, id: Uuid) -> ConfigResult<()> {
        configuration.set_id(id);
        self.store.save(configuration)?;
        info!("Updated configuration {} ({})", configuration.name, id);
        self.reload()
    }

    /// Delete a configuration together with its stored credentials
    pub fn remove(&mut self, id: Uuid) -> ConfigResult<()> {
        if let Some(configuration) = self.store.load(id)? {
            configuration.forget_secrets(self.secrets.as_ref())?;
        }
        self.store.remove(id)?;
        info!("Removed configuration {}", id);
        self.reload()
    }

    /// Re-read the store
    pub fn reload(&mut self) -> ConfigResult<()> {
        let mut configurations = self.store.load_all()?;
        for configuration in &mut configurations {
            for connection in [&mut configuration.source, &mut configuration.destination] {
                if let Connection::Sftp(sftp) = connection {
                    if let Err(e) = sftp.resolve_password(self.secrets.as_ref()) {
                        warn!(
                            "Could not resolve password for configuration {}: {}",
                            configuration.name, e
                        );
                    }
                }
            }
        }
        self.configurations = configurations;
        Ok(())
    }
}
