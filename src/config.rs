//! Relocator configuration
//!
//! A JSON file names the backends and assigns two of them to the `local`
//! and `storage` slots:
//!
//! ```json
//! {
//!   "local_backend": "uploads",
//!   "storage_backend": "bucket",
//!   "backends": {
//!     "uploads": { "type": "local", "root": "/srv/uploads" },
//!     "bucket": { "type": "b2", "bucket": "assets" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Env var pointing at the config file
pub const CONFIG_ENV: &str = "RELOCATOR_CONFIG";

/// Env vars consulted when a B2 backend omits its credentials
pub const B2_KEY_ID_ENV: &str = "B2_KEY_ID";
pub const B2_KEY_ENV: &str = "B2_KEY";

/// Definition of one named backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Directory on local disk
    Local { root: PathBuf },
    /// Backblaze B2 bucket
    B2 {
        bucket: String,
        #[serde(default)]
        key_id: Option<String>,
        #[serde(default)]
        key: Option<String>,
    },
}

fn default_local_backend() -> String {
    "local".to_string()
}

fn default_storage_backend() -> String {
    "storage".to_string()
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocatorConfig {
    /// Name of the source backend
    #[serde(default = "default_local_backend")]
    pub local_backend: String,
    /// Name of the destination backend
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,
    /// Backend definitions by name
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{slot} backend '{name}' is not defined")]
    UndefinedBackend { slot: &'static str, name: String },

    #[error("No config file found (pass --config or set RELOCATOR_CONFIG)")]
    NotFound,
}

impl RelocatorConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Both slots must name a defined backend
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (slot, name) in [
            ("local", &self.local_backend),
            ("storage", &self.storage_backend),
        ] {
            if !self.backends.contains_key(name) {
                return Err(ConfigError::UndefinedBackend {
                    slot,
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Config file location: explicit path, then `RELOCATOR_CONFIG`, then
    /// `<config dir>/relocator/config.json` if it exists
    pub fn locate(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join("relocator").join("config.json"))
            .filter(|path| path.is_file())
            .ok_or(ConfigError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "local_backend": "uploads",
        "storage_backend": "bucket",
        "backends": {
            "uploads": { "type": "local", "root": "/srv/uploads" },
            "bucket": { "type": "b2", "bucket": "assets", "key_id": "004abc" }
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = RelocatorConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.local_backend, "uploads");
        assert_eq!(config.storage_backend, "bucket");
        assert_eq!(
            config.backends["uploads"],
            BackendConfig::Local {
                root: PathBuf::from("/srv/uploads")
            }
        );
        assert_eq!(
            config.backends["bucket"],
            BackendConfig::B2 {
                bucket: "assets".to_string(),
                key_id: Some("004abc".to_string()),
                key: None,
            }
        );
    }

    #[test]
    fn test_default_slot_names() {
        let config = RelocatorConfig::from_json(
            r#"{
                "backends": {
                    "local": { "type": "local", "root": "/a" },
                    "storage": { "type": "local", "root": "/b" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.local_backend, "local");
        assert_eq!(config.storage_backend, "storage");
    }

    #[test]
    fn test_undefined_backend() {
        let err = RelocatorConfig::from_json(
            r#"{ "backends": { "local": { "type": "local", "root": "/a" } } }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UndefinedBackend { slot: "storage", ref name } if name == "storage"
        ));
    }

    #[test]
    fn test_unknown_backend_type() {
        let err = RelocatorConfig::from_json(
            r#"{ "backends": { "local": { "type": "ftp", "host": "x" } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = RelocatorConfig::load(&path).unwrap();
        assert_eq!(config.backends.len(), 2);

        let missing = RelocatorConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = PathBuf::from("/etc/relocator.json");
        assert_eq!(RelocatorConfig::locate(Some(path.clone())).unwrap(), path);
    }
}
