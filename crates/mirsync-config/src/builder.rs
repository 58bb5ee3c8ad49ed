//! Layered settings loading: defaults, files, then environment

use crate::{ConfigError, ConfigResult, Settings};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// Upper bound for the rename window; anything longer stalls every delete
const MAX_RENAME_WINDOW_MS: u64 = 5_000;

/// Settings builder for loading settings from multiple sources
///
/// Later sources override earlier ones. Missing files are skipped.
/// Environment variables use `__` between the prefix and nested keys, so
/// `MIRSYNC__ENGINE__IDLE_TIMEOUT_SECS=60` sets `engine.idle_timeout_secs`.
#[derive(Debug)]
pub struct SettingsBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<SettingsSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum SettingsSource {
    File { path: PathBuf, format: FileFormat },
    Environment { prefix: String },
}

impl SettingsBuilder {
    /// Create a new settings builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add a settings file source
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(SettingsSource::File { path, format });
        self
    }

    /// Add a settings file source with explicit format
    pub fn add_source_file_with_format<P: AsRef<Path>>(
        mut self,
        path: P,
        format: FileFormat,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        self.sources.push(SettingsSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(SettingsSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build the settings
    pub fn build(mut self) -> ConfigResult<Settings> {
        let defaults_value = serde_yaml::to_value(Settings::default())
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                SettingsSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                SettingsSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .separator(&self.env_separator)
                            .try_parsing(true),
                    );
                }
            }
        }

        let settings: Settings = self.inner.build()?.try_deserialize()?;
        Self::validate(&settings)?;

        Ok(settings)
    }

    /// Try to build the settings, returning defaults on error
    pub fn build_or_default(self) -> Settings {
        self.build().unwrap_or_default()
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate the settings
    pub(crate) fn validate(settings: &Settings) -> ConfigResult<()> {
        let engine = &settings.engine;

        if engine.rename_window_ms == 0 || engine.rename_window_ms > MAX_RENAME_WINDOW_MS {
            return Err(ConfigError::validation(format!(
                "Rename window must be between 1 and {} milliseconds",
                MAX_RENAME_WINDOW_MS
            )));
        }

        if engine.idle_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "Idle timeout must be greater than 0",
            ));
        }

        if engine.event_buffer == 0 {
            return Err(ConfigError::validation(
                "Event buffer must be greater than 0",
            ));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&settings.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
