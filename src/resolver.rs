//! Backend resolution
//!
//! Maps a backend name to a live `Filesystem` handle. Resolution failures are
//! configuration errors: callers get them as `Err`, they are never folded into
//! an operation's boolean result.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::b2::{B2Client, B2Error};
use crate::config::{BackendConfig, B2_KEY_ENV, B2_KEY_ID_ENV};
use crate::storage::{B2Filesystem, Filesystem, LocalFilesystem};

/// Errors raised while resolving a backend name
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("Backend '{name}': root {root} is not a directory")]
    InvalidRoot { name: String, root: String },

    #[error("Backend '{name}': missing {what}")]
    MissingCredentials { name: String, what: &'static str },

    #[error("Failed to mount backends: {0}")]
    Mount(String),

    #[error("Backend '{name}': {source}")]
    Remote {
        name: String,
        #[source]
        source: B2Error,
    },

    /// Backend is configured correctly but could not be reached right now
    #[error("Backend '{name}' unavailable: {source}")]
    Unavailable {
        name: String,
        #[source]
        source: B2Error,
    },
}

impl ResolveError {
    /// Classify a B2 authorization failure
    ///
    /// Network trouble, timeouts, rate limiting and 5xx responses that
    /// outlived the client's retries are transient. Bad credentials, denied
    /// access and an unknown bucket are misconfiguration.
    pub fn from_b2(name: &str, source: B2Error) -> Self {
        let name = name.to_string();
        if source.is_transient() {
            ResolveError::Unavailable { name, source }
        } else {
            ResolveError::Remote { name, source }
        }
    }
}

/// Turns backend names into filesystem handles
#[async_trait]
pub trait BackendResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Filesystem>, ResolveError>;
}

/// Builds a fresh handle from its config on every call
pub struct ConfigResolver {
    backends: BTreeMap<String, BackendConfig>,
}

impl ConfigResolver {
    pub fn new(backends: BTreeMap<String, BackendConfig>) -> Self {
        Self { backends }
    }

    fn credential(
        name: &str,
        configured: &Option<String>,
        env_var: &'static str,
        what: &'static str,
    ) -> Result<String, ResolveError> {
        configured
            .clone()
            .or_else(|| env::var(env_var).ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ResolveError::MissingCredentials {
                name: name.to_string(),
                what,
            })
    }
}

#[async_trait]
impl BackendResolver for ConfigResolver {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Filesystem>, ResolveError> {
        let config = self
            .backends
            .get(name)
            .ok_or_else(|| ResolveError::UnknownBackend(name.to_string()))?;

        match config {
            BackendConfig::Local { root } => {
                if !root.is_dir() {
                    return Err(ResolveError::InvalidRoot {
                        name: name.to_string(),
                        root: root.display().to_string(),
                    });
                }
                debug!(backend = name, root = %root.display(), "Resolved local backend");
                Ok(Arc::new(LocalFilesystem::new(root.clone())))
            }
            BackendConfig::B2 { bucket, key_id, key } => {
                let key_id = Self::credential(name, key_id, B2_KEY_ID_ENV, "B2 key id")?;
                let key = Self::credential(name, key, B2_KEY_ENV, "B2 application key")?;

                let client = B2Client::authorize(&key_id, &key, bucket)
                    .await
                    .map_err(|source| ResolveError::from_b2(name, source))?;
                debug!(backend = name, bucket = %bucket, "Resolved B2 backend");
                Ok(Arc::new(B2Filesystem::new(client)))
            }
        }
    }
}

/// Hands out pre-built handles, for embedding and tests
#[derive(Default)]
pub struct StaticResolver {
    filesystems: HashMap<String, Arc<dyn Filesystem>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under `name`
    pub fn with(mut self, name: &str, filesystem: Arc<dyn Filesystem>) -> Self {
        self.filesystems.insert(name.to_string(), filesystem);
        self
    }
}

#[async_trait]
impl BackendResolver for StaticResolver {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Filesystem>, ResolveError> {
        self.filesystems
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownBackend(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_local() {
        let dir = TempDir::new().unwrap();
        let mut backends = BTreeMap::new();
        backends.insert(
            "uploads".to_string(),
            BackendConfig::Local {
                root: dir.path().to_path_buf(),
            },
        );
        let resolver = ConfigResolver::new(backends);

        let fs = resolver.resolve("uploads").await.unwrap();
        assert!(fs.describe().starts_with("local:"));

        assert!(matches!(
            resolver.resolve("other").await,
            Err(ResolveError::UnknownBackend(ref name)) if name == "other"
        ));
    }

    #[tokio::test]
    async fn test_local_root_must_exist() {
        let dir = TempDir::new().unwrap();
        let mut backends = BTreeMap::new();
        backends.insert(
            "uploads".to_string(),
            BackendConfig::Local {
                root: dir.path().join("missing"),
            },
        );
        let resolver = ConfigResolver::new(backends);

        assert!(matches!(
            resolver.resolve("uploads").await,
            Err(ResolveError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn test_configured_credential_wins() {
        let value = ConfigResolver::credential(
            "bucket",
            &Some("004abc".to_string()),
            "RELOCATOR_TEST_UNSET_VAR",
            "B2 key id",
        )
        .unwrap();
        assert_eq!(value, "004abc");

        let err = ConfigResolver::credential("bucket", &None, "RELOCATOR_TEST_UNSET_VAR", "B2 key id")
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingCredentials { what: "B2 key id", .. }));
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let dir = TempDir::new().unwrap();
        let resolver = StaticResolver::new().with("local", Arc::new(LocalFilesystem::new(dir.path())));

        assert!(resolver.resolve("local").await.is_ok());
        assert!(resolver.resolve("storage").await.is_err());
    }

    #[test]
    fn test_transient_b2_failures_are_not_fatal() {
        for source in [
            B2Error::Network("connection reset".to_string()),
            B2Error::Timeout,
            B2Error::RateLimited,
            B2Error::Server(503, "service_unavailable".to_string()),
        ] {
            let err = ResolveError::from_b2("bucket", source);
            assert!(matches!(err, ResolveError::Unavailable { .. }), "{:?}", err);
        }
    }

    #[test]
    fn test_misconfigured_b2_is_fatal() {
        for source in [
            B2Error::AuthExpired,
            B2Error::Forbidden("unauthorized".to_string()),
            B2Error::NotFound("bucket 'assets'".to_string()),
        ] {
            let err = ResolveError::from_b2("bucket", source);
            assert!(matches!(err, ResolveError::Remote { .. }), "{:?}", err);
        }
    }
}
