//! User settings loaded from `<home>/.fleetstack/config.yaml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::paths;

/// Compose file name used when a stack has no entry point yet.
pub const COMPOSE_FILE_DEFAULT_NAME: &str = "docker-compose.yml";
/// Manifest file name used when a stack has no manifest yet.
pub const MANIFEST_FILE_DEFAULT_NAME: &str = "k8s-deployment.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compose_file_name: String,
    pub manifest_file_name: String,
    /// Read-modify-write attempts per endpoint relation before giving up on
    /// revision conflicts.
    pub relation_write_attempts: u32,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compose_file_name: COMPOSE_FILE_DEFAULT_NAME.to_string(),
            manifest_file_name: MANIFEST_FILE_DEFAULT_NAME.to_string(),
            relation_write_attempts: 3,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings rooted at `home`, falling back to defaults when absent.
    pub fn load_at(home: &Path) -> Result<Settings, StoreError> {
        let path = paths::config_path(home);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let mut settings: Settings =
            serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })?;
        if settings.relation_write_attempts == 0 {
            settings.relation_write_attempts = 1;
        }
        Ok(settings)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Settings, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeNotFound)?;
        Settings::load_at(&home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_missing() {
        let home = TempDir::new().expect("tempdir");
        let settings = Settings::load_at(home.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.compose_file_name, "docker-compose.yml");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let home = TempDir::new().expect("tempdir");
        let path = paths::config_path(home.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "manifest_file_name: fleet.yml\nrelation_write_attempts: 0\n")
            .expect("write");

        let settings = Settings::load_at(home.path()).expect("load");
        assert_eq!(settings.manifest_file_name, "fleet.yml");
        assert_eq!(settings.compose_file_name, COMPOSE_FILE_DEFAULT_NAME);
        assert_eq!(settings.relation_write_attempts, 1, "zero attempts is clamped");
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().expect("tempdir");
        let path = paths::config_path(home.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "relation_write_attempts: [not a number").expect("write");

        let err = Settings::load_at(home.path()).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }
}
