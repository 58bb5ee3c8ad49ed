//! Settings loader utilities

use crate::{ConfigError, ConfigResult, Settings, SettingsBuilder};
use std::path::{Path, PathBuf};

/// Environment prefix for settings overrides
pub const ENV_PREFIX: &str = "MIRSYNC";

/// Settings loader with common loading patterns
pub struct SettingsLoader;

impl SettingsLoader {
    /// Load settings from the first settings file found in the default
    /// locations, then apply environment overrides
    pub fn load_default() -> ConfigResult<Settings> {
        let mut builder = SettingsBuilder::new();

        if let Some(path) = Self::settings_exists() {
            builder = builder.add_source_file(path);
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Load settings from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Settings> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "Settings file not found"),
            });
        }

        SettingsBuilder::new()
            .add_source_file(path)
            .add_env_prefix(ENV_PREFIX)
            .build()
    }

    /// Save settings to a file, picking the format from the extension
    pub fn save_to_file<P: AsRef<Path>>(settings: &Settings, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::to_string_pretty(settings)?,
            Some("json") => serde_json::to_string_pretty(settings)?,
            _ => serde_yaml::to_string(settings)?,
        };

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write a settings file holding the defaults
    pub fn generate_default<P: AsRef<Path>>(path: P) -> ConfigResult<()> {
        Self::save_to_file(&Settings::default(), path)
    }

    /// First existing settings file in the default locations
    pub fn settings_exists() -> Option<PathBuf> {
        Self::default_paths().into_iter().find(|path| path.exists())
    }

    /// Default settings file paths in order of preference
    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("mirsync.yaml"),
            PathBuf::from("mirsync.yml"),
            PathBuf::from("mirsync.toml"),
            PathBuf::from(".mirsync.yaml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let mirsync_dir = config_dir.join("mirsync");
            paths.push(mirsync_dir.join("settings.yaml"));
            paths.push(mirsync_dir.join("settings.toml"));
        }

        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/mirsync/settings.yaml"));

        paths
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join("Library").join("Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|home| PathBuf::from(home).join(".config"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("settings.yaml")]
    #[case("settings.toml")]
    #[case("settings.json")]
    fn test_save_and_load(#[case] file_name: &str) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(file_name);

        let mut settings = Settings::default();
        settings.engine.rename_window_ms = 75;
        settings.engine.initial_upload = true;
        SettingsLoader::save_to_file(&settings, &path).unwrap();

        let loaded = SettingsLoader::load_from_file(&path).unwrap();
        assert_eq!(loaded.engine.rename_window_ms, 75);
        assert!(loaded.engine.initial_upload);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = SettingsLoader::load_from_file(temp_dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_generate_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("default.yaml");

        SettingsLoader::generate_default(&path).unwrap();
        let settings = SettingsLoader::load_from_file(&path).unwrap();
        assert_eq!(settings.engine.idle_timeout_secs, 300);
    }
}
