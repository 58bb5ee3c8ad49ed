//! Password storage keyed by `(user, host)`
//!
//! Passwords never travel through the configuration store. A [`SecretStore`]
//! behaves like an OS keychain: adding an entry that already exists fails,
//! updating an entry that does not exist fails, deleting is idempotent.

use crate::{ConfigError, ConfigResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// Keychain-like credential store
pub trait SecretStore: Send + Sync {
    /// Read the password for `(user, host)`
    fn get(&self, user: &str, host: &str) -> ConfigResult<String>;

    /// Add a new entry. Fails if one already exists.
    fn set(&self, user: &str, host: &str, password: &str) -> ConfigResult<()>;

    /// Rewrite an existing entry, optionally moving it to a new `(user, host)`
    fn update(
        &self,
        user: &str,
        host: &str,
        new_user: Option<&str>,
        new_host: Option<&str>,
        new_password: Option<&str>,
    ) -> ConfigResult<()>;

    /// Delete the entry if present
    fn delete(&self, user: &str, host: &str) -> ConfigResult<()>;

    /// Add the entry, or overwrite its password if it exists
    fn upsert(&self, user: &str, host: &str, password: &str) -> ConfigResult<()> {
        match self.get(user, host) {
            Ok(_) => self.update(user, host, None, None, Some(password)),
            Err(e) if e.is_secret_not_found() => self.set(user, host, password),
            Err(e) => Err(e),
        }
    }
}

/// In-process secret store
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl MemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(user: &str, host: &str) -> (String, String) {
    (user.to_string(), host.to_string())
}

fn poisoned() -> ConfigError {
    ConfigError::secret("secret store lock poisoned")
}

impl SecretStore for MemorySecretStore {
    fn get(&self, user: &str, host: &str) -> ConfigResult<String> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        entries
            .get(&key(user, host))
            .cloned()
            .ok_or_else(|| ConfigError::secret_not_found(user, host))
    }

    fn set(&self, user: &str, host: &str, password: &str) -> ConfigResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let k = key(user, host);
        if entries.contains_key(&k) {
            return Err(ConfigError::secret(format!(
                "an entry for {}@{} already exists",
                user, host
            )));
        }
        entries.insert(k, password.to_string());
        Ok(())
    }

    fn update(
        &self,
        user: &str,
        host: &str,
        new_user: Option<&str>,
        new_host: Option<&str>,
        new_password: Option<&str>,
    ) -> ConfigResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let current = entries
            .remove(&key(user, host))
            .ok_or_else(|| ConfigError::secret_not_found(user, host))?;

        let target = key(new_user.unwrap_or(user), new_host.unwrap_or(host));
        let password = new_password.map_or(current, str::to_string);
        entries.insert(target, password);
        Ok(())
    }

    fn delete(&self, user: &str, host: &str) -> ConfigResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(&key(user, host));
        Ok(())
    }
}
