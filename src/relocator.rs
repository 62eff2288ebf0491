//! Relocator - moves files from the local backend into storage
//!
//! Each operation resolves both backends, mounts them as `local://` and
//! `storage://`, performs a short linear sequence (exists, delete-if-present,
//! copy or move) and then lists the file's directory on the storage backend so
//! downstream indexes pick up the change.
//!
//! Filesystem errors are absorbed here: they are logged and reported through
//! `Outcome` or a `false` result. So is a backend that is configured but
//! temporarily unreachable. Only misconfiguration surfaces as `Err`.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RelocatorConfig;
use crate::mount::{MountManager, MountPath};
use crate::resolver::{BackendResolver, ConfigResolver, ResolveError};
use crate::storage::{Filesystem, RelativePath, StorageError, StorageResult};

/// Mount prefix of the source backend
pub const LOCAL_MOUNT: &str = "local";
/// Mount prefix of the destination backend
pub const STORAGE_MOUNT: &str = "storage";

/// Result of one relocation call
#[derive(Debug)]
pub enum Outcome {
    /// Transfer (or delete) done and the cache refresh went through
    Completed,
    /// The file operation itself failed
    TransferFailed(StorageError),
    /// The file landed in storage but the refresh listing failed
    NotifyFailed(StorageError),
    /// Move only: the file landed in storage but the local source remains
    SourceNotRemoved(StorageError),
}

impl Outcome {
    /// Overall success as reported by the boolean API
    ///
    /// A failed refresh or a leftover source counts as failure here even
    /// though the file reached storage.
    pub fn succeeded(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    /// Whether the file operation took effect
    pub fn transferred(&self) -> bool {
        !matches!(self, Outcome::TransferFailed(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum Transfer {
    Copy,
    Move,
}

impl Transfer {
    fn operation(self) -> &'static str {
        match self {
            Transfer::Copy => "copy_to_storage",
            Transfer::Move => "move_to_storage",
        }
    }
}

/// Turn a temporarily unreachable backend into a transfer failure; anything
/// else is misconfiguration and stays an `Err`
fn unavailable(operation: &str, raw_path: &str, err: ResolveError) -> Result<StorageError, ResolveError> {
    match err {
        ResolveError::Unavailable { name, source } => {
            error!(operation = operation, path = raw_path, backend = %name, error = %source, "Backend unavailable");
            Ok(StorageError::Remote {
                path: raw_path.to_string(),
                source,
            })
        }
        fatal => Err(fatal),
    }
}

fn local_uri(path: &RelativePath) -> String {
    MountPath::new(LOCAL_MOUNT, path.clone()).to_string()
}

fn storage_uri(path: &RelativePath) -> String {
    MountPath::new(STORAGE_MOUNT, path.clone()).to_string()
}

/// Copies, moves and deletes files between two named backends
pub struct Relocator {
    /// Name of the source backend
    local_backend: String,
    /// Name of the destination backend
    storage_backend: String,
    resolver: Arc<dyn BackendResolver>,
}

impl Relocator {
    pub fn new(
        local_backend: impl Into<String>,
        storage_backend: impl Into<String>,
        resolver: Arc<dyn BackendResolver>,
    ) -> Self {
        Self {
            local_backend: local_backend.into(),
            storage_backend: storage_backend.into(),
            resolver,
        }
    }

    /// Relocator over the backends defined in a config file
    pub fn from_config(config: &RelocatorConfig) -> Self {
        Self::new(
            config.local_backend.clone(),
            config.storage_backend.clone(),
            Arc::new(ConfigResolver::new(config.backends.clone())),
        )
    }

    pub fn local_backend(&self) -> &str {
        &self.local_backend
    }

    pub fn storage_backend(&self) -> &str {
        &self.storage_backend
    }

    /// Resolve fresh handles for both configured backends
    pub async fn resolve_backends(
        &self,
    ) -> Result<(Arc<dyn Filesystem>, Arc<dyn Filesystem>), ResolveError> {
        let local = self.resolver.resolve(&self.local_backend).await?;
        let storage = self.resolver.resolve(&self.storage_backend).await?;
        Ok((local, storage))
    }

    /// Mount both backends under `local://` and `storage://`
    pub async fn mount_manager(&self) -> Result<MountManager, ResolveError> {
        let (local, storage) = self.resolve_backends().await?;
        Self::mount(local, storage)
    }

    fn mount(
        local: Arc<dyn Filesystem>,
        storage: Arc<dyn Filesystem>,
    ) -> Result<MountManager, ResolveError> {
        let mut manager = MountManager::new();
        for (prefix, filesystem) in [(LOCAL_MOUNT, local), (STORAGE_MOUNT, storage)] {
            manager
                .mount(prefix, filesystem)
                .map_err(|e| ResolveError::Mount(e.to_string()))?;
        }
        Ok(manager)
    }

    /// Copy `path` from the local backend into storage, replacing any existing file
    pub async fn copy_to_storage(&self, path: &str) -> Result<bool, ResolveError> {
        Ok(self.copy_to_storage_outcome(path).await?.succeeded())
    }

    /// Move `path` from the local backend into storage, replacing any existing file
    pub async fn move_to_storage(&self, path: &str) -> Result<bool, ResolveError> {
        Ok(self.move_to_storage_outcome(path).await?.succeeded())
    }

    /// Remove `path` from storage; absent files count as success
    pub async fn delete_from_storage(&self, path: &str) -> Result<bool, ResolveError> {
        Ok(self.delete_from_storage_outcome(path).await?.succeeded())
    }

    pub async fn copy_to_storage_outcome(&self, path: &str) -> Result<Outcome, ResolveError> {
        self.transfer(path, Transfer::Copy).await
    }

    pub async fn move_to_storage_outcome(&self, path: &str) -> Result<Outcome, ResolveError> {
        self.transfer(path, Transfer::Move).await
    }

    pub async fn delete_from_storage_outcome(&self, raw_path: &str) -> Result<Outcome, ResolveError> {
        const OPERATION: &str = "delete_from_storage";

        let manager = match self.mount_manager().await {
            Ok(manager) => manager,
            Err(e) => return Ok(Outcome::TransferFailed(unavailable(OPERATION, raw_path, e)?)),
        };
        let path = match RelativePath::parse(raw_path) {
            Ok(path) => path,
            Err(e) => {
                error!(operation = OPERATION, path = raw_path, error = %e, "Rejected path");
                return Ok(Outcome::TransferFailed(e));
            }
        };
        let uri = storage_uri(&path);

        match manager.has(&uri).await {
            Ok(false) => {
                debug!(operation = OPERATION, path = %path, "Nothing to delete");
                return Ok(Outcome::Completed);
            }
            Ok(true) => {}
            Err(e) => {
                error!(operation = OPERATION, path = %path, error = %e, "Existence check failed");
                return Ok(Outcome::TransferFailed(e));
            }
        }

        match manager.delete(&uri).await {
            Ok(()) => {
                info!(operation = OPERATION, path = %path, "Deleted file from storage");
                Ok(Outcome::Completed)
            }
            Err(e) if e.is_not_found() => {
                // Removed by someone else between the check and the delete
                warn!(operation = OPERATION, path = %path, error = %e, "File vanished before delete");
                Ok(Outcome::Completed)
            }
            Err(e) => {
                error!(operation = OPERATION, path = %path, error = %e, "Delete failed");
                Ok(Outcome::TransferFailed(e))
            }
        }
    }

    /// List the directory containing `path` on the storage backend
    ///
    /// The listing itself is discarded; the call exists for its side effect on
    /// whatever index sits behind the storage backend.
    pub async fn refresh_cache(&self, raw_path: &str) -> Result<bool, ResolveError> {
        let storage = match self.resolver.resolve(&self.storage_backend).await {
            Ok(storage) => storage,
            Err(e) => {
                unavailable("refresh_cache", raw_path, e)?;
                return Ok(false);
            }
        };
        let path = match RelativePath::parse_dir(raw_path) {
            Ok(path) => path,
            Err(e) => {
                error!(operation = "refresh_cache", path = raw_path, error = %e, "Rejected path");
                return Ok(false);
            }
        };
        Ok(Self::notify(storage.as_ref(), &path).await.is_ok())
    }

    async fn notify(storage: &dyn Filesystem, path: &RelativePath) -> StorageResult<()> {
        let dir = path.parent();
        match storage.list(&dir).await {
            Ok(entries) => {
                debug!(dir = %dir, entries = entries.len(), "Refreshed storage listing");
                Ok(())
            }
            Err(e) => {
                error!(operation = "refresh_cache", dir = %dir, error = %e, "Cache refresh listing failed");
                Err(e)
            }
        }
    }

    async fn transfer(&self, raw_path: &str, mode: Transfer) -> Result<Outcome, ResolveError> {
        let (local, storage) = match self.resolve_backends().await {
            Ok(backends) => backends,
            Err(e) => return Ok(Outcome::TransferFailed(unavailable(mode.operation(), raw_path, e)?)),
        };
        let manager = Self::mount(local, Arc::clone(&storage))?;

        let path = match RelativePath::parse(raw_path) {
            Ok(path) => path,
            Err(e) => {
                error!(operation = mode.operation(), path = raw_path, error = %e, "Rejected path");
                return Ok(Outcome::TransferFailed(e));
            }
        };

        let leftover = match Self::replace_in_storage(&manager, &path, mode).await {
            Ok(()) => {
                info!(operation = mode.operation(), path = %path, "Transferred file to storage");
                None
            }
            Err(StorageError::SourceNotRemoved { to, source }) => {
                error!(operation = mode.operation(), path = %path, to = %to, error = %source, "File copied to storage but local source was not removed");
                Some(*source)
            }
            Err(e) => {
                error!(operation = mode.operation(), path = %path, error = %e, "Transfer to storage failed");
                return Ok(Outcome::TransferFailed(e));
            }
        };

        // The file is in storage either way, so the refresh always runs
        let notified = Self::notify(storage.as_ref(), &path).await;
        Ok(match (leftover, notified) {
            (Some(e), _) => Outcome::SourceNotRemoved(e),
            (None, Ok(())) => Outcome::Completed,
            (None, Err(e)) => Outcome::NotifyFailed(e),
        })
    }

    /// Delete any existing storage copy, then copy or move the local file over
    async fn replace_in_storage(
        manager: &MountManager,
        path: &RelativePath,
        mode: Transfer,
    ) -> StorageResult<()> {
        let from = local_uri(path);
        let to = storage_uri(path);

        if manager.has(&to).await? {
            manager.delete(&to).await?;
            debug!(path = %path, "Removed existing file from storage");
        }

        match mode {
            Transfer::Copy => manager.copy(&from, &to).await,
            Transfer::Move => manager.move_file(&from, &to).await,
        }
    }
}
