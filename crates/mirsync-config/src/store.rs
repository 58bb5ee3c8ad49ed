//! Persistence for sync configurations

use crate::{ConfigError, ConfigResult, Configuration};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Keyed storage for [`Configuration`] records
///
/// Passwords are never part of a stored record.
pub trait ConfigurationStore: Send + Sync {
    /// Insert the configuration, replacing any record with the same id
    fn save(&self, configuration: &Configuration) -> ConfigResult<()>;

    /// Look a configuration up by id
    fn load(&self, id: Uuid) -> ConfigResult<Option<Configuration>>;

    /// Every stored configuration, in insertion order
    fn load_all(&self) -> ConfigResult<Vec<Configuration>>;

    /// Delete one record. Absent ids are ignored.
    fn remove(&self, id: Uuid) -> ConfigResult<()> {
        self.remove_many(&[id])
    }

    /// Delete several records
    fn remove_many(&self, ids: &[Uuid]) -> ConfigResult<()>;

    /// Delete every record
    fn remove_all(&self) -> ConfigResult<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    configurations: Vec<Configuration>,
}

impl StoreDocument {
    fn upsert(&mut self, configuration: &Configuration) {
        match self
            .configurations
            .iter_mut()
            .find(|existing| existing.id() == configuration.id())
        {
            Some(existing) => *existing = configuration.clone(),
            None => self.configurations.push(configuration.clone()),
        }
    }

    fn find(&self, id: Uuid) -> Option<Configuration> {
        self.configurations.iter().find(|c| c.id() == id).cloned()
    }

    fn retain_except(&mut self, ids: &[Uuid]) {
        self.configurations.retain(|c| !ids.contains(&c.id()));
    }
}

#[derive(Debug, Clone, Copy)]
enum StoreFormat {
    Yaml,
    Json,
}

/// Configuration store backed by one YAML or JSON file
///
/// The format follows the file extension (`.json` for JSON, YAML otherwise).
/// A missing file reads as an empty store. Writes go to a temporary sibling
/// that is renamed over the target.
#[derive(Debug)]
pub struct FileConfigurationStore {
    path: PathBuf,
    format: StoreFormat,
    lock: Mutex<()>,
}

impl FileConfigurationStore {
    /// Store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => StoreFormat::Json,
            _ => StoreFormat::Yaml,
        };
        Self {
            path,
            format,
            lock: Mutex::new(()),
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> ConfigResult<StoreDocument> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreDocument::default()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        let parsed = match self.format {
            StoreFormat::Yaml => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            StoreFormat::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: self.path.clone(),
            message,
        })
    }

    fn write(&self, document: &StoreDocument) -> ConfigResult<()> {
        let content = match self.format {
            StoreFormat::Yaml => serde_yaml::to_string(document)?,
            StoreFormat::Json => serde_json::to_string_pretty(document)?,
        };

        let io_error = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, content).map_err(io_error)?;
        std::fs::rename(&tmp, &self.path).map_err(io_error)?;

        debug!(
            "Wrote {} configurations to {}",
            document.configurations.len(),
            self.path.display()
        );
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut StoreDocument)) -> ConfigResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ConfigError::other("configuration store lock poisoned"))?;
        let mut document = self.read()?;
        f(&mut document);
        self.write(&document)
    }

    fn snapshot(&self) -> ConfigResult<StoreDocument> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ConfigError::other("configuration store lock poisoned"))?;
        self.read()
    }
}

impl ConfigurationStore for FileConfigurationStore {
    fn save(&self, configuration: &Configuration) -> ConfigResult<()> {
        self.modify(|document| document.upsert(configuration))
    }

    fn load(&self, id: Uuid) -> ConfigResult<Option<Configuration>> {
        Ok(self.snapshot()?.find(id))
    }

    fn load_all(&self) -> ConfigResult<Vec<Configuration>> {
        Ok(self.snapshot()?.configurations)
    }

    fn remove_many(&self, ids: &[Uuid]) -> ConfigResult<()> {
        self.modify(|document| document.retain_except(ids))
    }

    fn remove_all(&self) -> ConfigResult<()> {
        self.modify(|document| document.configurations.clear())
    }
}

/// In-process configuration store
#[derive(Debug, Default)]
pub struct MemoryConfigurationStore {
    document: Mutex<StoreDocument>,
}

impl MemoryConfigurationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut StoreDocument) -> T) -> ConfigResult<T> {
        let mut document = self
            .document
            .lock()
            .map_err(|_| ConfigError::other("configuration store lock poisoned"))?;
        Ok(f(&mut document))
    }
}

impl ConfigurationStore for MemoryConfigurationStore {
    fn save(&self, configuration: &Configuration) -> ConfigResult<()> {
        self.with(|document| document.upsert(configuration))
    }

    fn load(&self, id: Uuid) -> ConfigResult<Option<Configuration>> {
        self.with(|document| document.find(id))
    }

    fn load_all(&self) -> ConfigResult<Vec<Configuration>> {
        self.with(|document| document.configurations.clone())
    }

    fn remove_many(&self, ids: &[Uuid]) -> ConfigResult<()> {
        self.with(|document| document.retain_except(ids))
    }

    fn remove_all(&self) -> ConfigResult<()> {
        self.with(|document| document.configurations.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Connection, MemorySecretStore, SftpConnection};
    use rstest::rstest;
    use tempfile::TempDir;

    fn local(name: &str) -> Configuration {
        Configuration::new(name, Connection::local("/src"), Connection::local("/dst"))
    }

    #[rstest]
    #[case("configurations.yaml")]
    #[case("configurations.json")]
    fn test_file_store_crud(#[case] file_name: &str) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigurationStore::new(temp_dir.path().join("nested").join(file_name));
        assert!(store.load_all().unwrap().is_empty());

        let mut first = local("first");
        let second = local("second");
        store.save(&first).unwrap();
        store.save(&second).unwrap();

        first.name = "renamed".to_string();
        store.save(&first).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "renamed");
        assert_eq!(store.load(second.id()).unwrap().unwrap().id(), second.id());

        store.remove(first.id()).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);

        store.remove_all().unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_never_persists_passwords() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("configurations.yaml");
        let store = FileConfigurationStore::new(&path);
        let secrets = MemorySecretStore::new();

        let sftp = SftpConnection::with_password("/srv", "example.org", None, "alice", "s3cret", &secrets).unwrap();
        store
            .save(&Configuration::new("remote", Connection::local("/src"), Connection::Sftp(sftp)))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("s3cret"));
        assert!(content.contains("type: password"));
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("configurations.yaml");
        std::fs::write(&path, "configurations: [[[").unwrap();

        let store = FileConfigurationStore::new(&path);
        assert!(matches!(store.load_all(), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_memory_store_remove_many() {
        let store = MemoryConfigurationStore::new();
        let configs: Vec<_> = ["a", "b", "c"].iter().map(|n| local(n)).collect();
        for config in &configs {
            store.save(config).unwrap();
        }

        store.remove_many(&[configs[0].id(), configs[2].id()]).unwrap();
        let remaining = store.load_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "b");
    }
}
