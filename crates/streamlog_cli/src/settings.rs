//! Backend and log settings from the command line or a JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use streamlog_core::{BackendConfig, Config, EventLogClient};
use tracing::info;

/// Everything needed to open a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Which backend to open.
    pub backend: BackendConfig,
    /// Log tuning.
    #[serde(default)]
    pub log: Config,
}

impl Settings {
    /// Combines `--config` and `--backend`; the connection string wins.
    pub fn resolve(
        backend: Option<&str>,
        config: Option<&Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let from_file = match config {
            Some(path) => Some(Self::load(path)?),
            None => None,
        };

        match (backend, from_file) {
            (Some(connection), file) => Ok(Self {
                backend: BackendConfig::parse(connection)?,
                log: file.map(|s| s.log).unwrap_or_default(),
            }),
            (None, Some(file)) => Ok(file),
            (None, None) => Err("a backend is required: pass --backend or --config".into()),
        }
    }

    /// Reads settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Loading settings from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.log.validate()?;
        Ok(settings)
    }

    /// Opens the configured log.
    pub fn open(&self) -> Result<EventLogClient, Box<dyn std::error::Error>> {
        let log = EventLogClient::open(&self.backend, self.log.clone())?;
        info!("Opened {}", log.driver_info());
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use streamlog_core::BlobEndpoint;

    #[test]
    fn test_load_json_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "backend": { "kind": "files", "root": "/var/lib/events" },
                "log": { "sync_on_commit": false, "read_page_size": 50 }
            }"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(
            settings.backend,
            BackendConfig::Files {
                root: PathBuf::from("/var/lib/events")
            }
        );
        assert!(!settings.log.sync_on_commit);
        assert_eq!(settings.log.read_page_size, 50);
        assert_eq!(settings.log.import_attempts, Config::default().import_attempts);
    }

    #[test]
    fn test_connection_string_overrides_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "backend": { "kind": "blob", "store": "memory", "container": "a" },
                 "log": { "staging_window": 8 } }"#,
        )
        .unwrap();

        let settings = Settings::resolve(Some("blob+mem://b"), Some(&path)).unwrap();
        assert_eq!(
            settings.backend,
            BackendConfig::Blob {
                store: BlobEndpoint::Memory,
                container: "b".to_string()
            }
        );
        assert_eq!(settings.log.staging_window, 8);
    }

    #[test]
    fn test_missing_backend() {
        assert!(Settings::resolve(None, None).is_err());
        assert!(Settings::resolve(Some("ftp://nowhere"), None).is_err());
    }

    #[test]
    fn test_rejects_invalid_log_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "backend": { "kind": "blob", "store": "memory", "container": "a" },
                 "log": { "read_page_size": 0 } }"#,
        )
        .unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
