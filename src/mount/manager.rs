//! Mount Manager - one namespace over several filesystems
//!
//! Each filesystem is mounted under a prefix and addressed as
//! `prefix://relative/path`. Operations spanning two mounts are carried out
//! as read-from-source, write-to-destination.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::storage::{Entry, Filesystem, RelativePath, StorageError, StorageResult};

/// Separator between mount prefix and path
const SCHEME_SEPARATOR: &str = "://";

/// A `prefix://path` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPath {
    /// Mount prefix
    pub mount: String,
    /// Path within the mounted filesystem
    pub path: RelativePath,
}

impl MountPath {
    pub fn new(mount: impl Into<String>, path: RelativePath) -> Self {
        Self {
            mount: mount.into(),
            path,
        }
    }

    /// Parse `prefix://path`
    ///
    /// The path part may be empty (the mount root), which is only useful for
    /// listings; file operations reject it through the backends.
    pub fn parse(uri: &str) -> StorageResult<Self> {
        let (mount, rest) = uri
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| StorageError::Mount(format!("'{}' has no mount prefix", uri)))?;

        if !is_valid_prefix(mount) {
            return Err(StorageError::Mount(format!("invalid mount prefix '{}'", mount)));
        }

        Ok(Self {
            mount: mount.to_string(),
            path: RelativePath::parse_dir(rest)?,
        })
    }
}

impl fmt::Display for MountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.mount, SCHEME_SEPARATOR, self.path)
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Routes operations to mounted filesystems by prefix
#[derive(Default)]
pub struct MountManager {
    /// Mounted filesystems by prefix
    mounts: HashMap<String, Arc<dyn Filesystem>>,
}

impl MountManager {
    /// Create an empty mount manager
    pub fn new() -> Self {
        Self {
            mounts: HashMap::new(),
        }
    }

    /// Mount a filesystem under a prefix
    pub fn mount(&mut self, prefix: &str, filesystem: Arc<dyn Filesystem>) -> StorageResult<()> {
        if !is_valid_prefix(prefix) {
            return Err(StorageError::Mount(format!("invalid mount prefix '{}'", prefix)));
        }
        if self.mounts.contains_key(prefix) {
            return Err(StorageError::Mount(format!("prefix '{}' is already mounted", prefix)));
        }

        debug!(prefix = prefix, filesystem = %filesystem.describe(), "Mounted filesystem");
        self.mounts.insert(prefix.to_string(), filesystem);
        Ok(())
    }

    /// Filesystem mounted under `prefix`
    pub fn filesystem(&self, prefix: &str) -> StorageResult<&Arc<dyn Filesystem>> {
        self.mounts
            .get(prefix)
            .ok_or_else(|| StorageError::Mount(format!("no filesystem mounted at '{}'", prefix)))
    }

    fn locate(&self, uri: &str) -> StorageResult<(&Arc<dyn Filesystem>, MountPath)> {
        let location = MountPath::parse(uri)?;
        let filesystem = self.filesystem(&location.mount)?;
        Ok((filesystem, location))
    }

    /// Resolve a URI that must name a file, not a mount root
    fn locate_file(&self, uri: &str) -> StorageResult<(&Arc<dyn Filesystem>, MountPath)> {
        let (filesystem, location) = self.locate(uri)?;
        if location.path.is_root() {
            return Err(StorageError::InvalidPath {
                path: uri.to_string(),
                reason: "path is empty",
            });
        }
        Ok((filesystem, location))
    }

    /// Whether a file exists at `uri`
    pub async fn has(&self, uri: &str) -> StorageResult<bool> {
        let (filesystem, location) = self.locate_file(uri)?;
        filesystem.exists(&location.path).await
    }

    pub async fn read(&self, uri: &str) -> StorageResult<Vec<u8>> {
        let (filesystem, location) = self.locate_file(uri)?;
        filesystem.read(&location.path).await
    }

    pub async fn write(&self, uri: &str, data: &[u8]) -> StorageResult<()> {
        let (filesystem, location) = self.locate_file(uri)?;
        filesystem.write(&location.path, data).await
    }

    pub async fn delete(&self, uri: &str) -> StorageResult<()> {
        let (filesystem, location) = self.locate_file(uri)?;
        filesystem.delete(&location.path).await
    }

    /// List the immediate children of a directory URI
    pub async fn list(&self, uri: &str) -> StorageResult<Vec<Entry>> {
        let (filesystem, location) = self.locate(uri)?;
        filesystem.list(&location.path).await
    }

    /// Copy a file between (or within) mounts
    ///
    /// The destination must not exist.
    pub async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        let (source, from_location) = self.locate_file(from)?;
        let (destination, to_location) = self.locate_file(to)?;

        if from_location.mount == to_location.mount {
            return source.copy(&from_location.path, &to_location.path).await;
        }

        let data = source.read(&from_location.path).await?;
        destination.write(&to_location.path, &data).await?;

        info!(from = %from_location, to = %to_location, size = data.len(), "Copied file");
        Ok(())
    }

    /// Move a file between (or within) mounts
    ///
    /// Across mounts the source is deleted only after the destination write
    /// succeeded; a failed copy leaves the source untouched. If only that
    /// delete fails the error is `SourceNotRemoved`, since the destination
    /// already holds the file.
    pub async fn move_file(&self, from: &str, to: &str) -> StorageResult<()> {
        let (source, from_location) = self.locate_file(from)?;
        let (_, to_location) = self.locate_file(to)?;

        if from_location.mount == to_location.mount {
            return source.rename(&from_location.path, &to_location.path).await;
        }

        self.copy(from, to).await?;
        if let Err(e) = source.delete(&from_location.path).await {
            warn!(from = %from_location, to = %to_location, error = %e, "Source not removed after copy");
            return Err(StorageError::SourceNotRemoved {
                to: to_location.to_string(),
                source: Box::new(e),
            });
        }

        info!(from = %from_location, to = %to_location, "Moved file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFilesystem;
    use crate::testing::{Fault, FaultyFilesystem};
    use tempfile::TempDir;

    fn manager(local: &TempDir, storage: &TempDir) -> MountManager {
        let mut manager = MountManager::new();
        manager
            .mount("local", Arc::new(LocalFilesystem::new(local.path())))
            .unwrap();
        manager
            .mount("storage", Arc::new(LocalFilesystem::new(storage.path())))
            .unwrap();
        manager
    }

    #[test]
    fn test_parse_mount_path() {
        let location = MountPath::parse("storage://a/b.txt").unwrap();
        assert_eq!(location.mount, "storage");
        assert_eq!(location.path.as_str(), "a/b.txt");
        assert_eq!(location.to_string(), "storage://a/b.txt");

        assert!(MountPath::parse("storage://").unwrap().path.is_root());
        assert!(MountPath::parse("a/b.txt").is_err());
        assert!(MountPath::parse("://a").is_err());
        assert!(MountPath::parse("bad prefix://a").is_err());
        assert!(MountPath::parse("local://../x").is_err());
    }

    #[test]
    fn test_duplicate_mount_rejected() {
        let dir = TempDir::new().unwrap();
        let mut manager = MountManager::new();
        manager
            .mount("local", Arc::new(LocalFilesystem::new(dir.path())))
            .unwrap();
        let err = manager
            .mount("local", Arc::new(LocalFilesystem::new(dir.path())))
            .unwrap_err();
        assert!(matches!(err, StorageError::Mount(_)));
        assert!(manager.filesystem("local").is_ok());
        assert!(manager.filesystem("storage").is_err());
    }

    #[tokio::test]
    async fn test_unknown_mount() {
        let (local, storage) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let manager = manager(&local, &storage);
        assert!(matches!(
            manager.has("remote://a.txt").await.unwrap_err(),
            StorageError::Mount(_)
        ));
    }

    #[tokio::test]
    async fn test_copy_across_mounts() {
        let (local, storage) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let manager = manager(&local, &storage);

        manager.write("local://a/b.txt", b"hi").await.unwrap();
        manager.copy("local://a/b.txt", "storage://a/b.txt").await.unwrap();

        assert_eq!(manager.read("storage://a/b.txt").await.unwrap(), b"hi");
        assert!(manager.has("local://a/b.txt").await.unwrap());

        // Destination now exists; a second copy conflicts
        let err = manager
            .copy("local://a/b.txt", "storage://a/b.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_move_across_mounts() {
        let (local, storage) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let manager = manager(&local, &storage);

        manager.write("local://a/b.txt", b"hi").await.unwrap();
        manager.move_file("local://a/b.txt", "storage://a/b.txt").await.unwrap();

        assert!(!manager.has("local://a/b.txt").await.unwrap());
        assert_eq!(manager.read("storage://a/b.txt").await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_failed_move_keeps_source() {
        let (local, storage) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let manager = manager(&local, &storage);

        manager.write("local://a/b.txt", b"new").await.unwrap();
        manager.write("storage://a/b.txt", b"old").await.unwrap();

        let err = manager
            .move_file("local://a/b.txt", "storage://a/b.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(manager.read("local://a/b.txt").await.unwrap(), b"new");
        assert_eq!(manager.read("storage://a/b.txt").await.unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_move_reports_source_left_behind() {
        let (local, storage) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let source = Arc::new(FaultyFilesystem::new(local.path()));
        source.fail("delete", Fault::Io);
        let mut manager = MountManager::new();
        manager.mount("local", source).unwrap();
        manager
            .mount("storage", Arc::new(LocalFilesystem::new(storage.path())))
            .unwrap();

        manager.write("local://a/b.txt", b"hi").await.unwrap();
        let err = manager
            .move_file("local://a/b.txt", "storage://a/b.txt")
            .await
            .unwrap_err();

        match err {
            StorageError::SourceNotRemoved { to, source } => {
                assert_eq!(to, "storage://a/b.txt");
                assert!(matches!(*source, StorageError::Io { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(manager.read("storage://a/b.txt").await.unwrap(), b"hi");
        assert!(manager.has("local://a/b.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_within_mount() {
        let (local, storage) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let manager = manager(&local, &storage);

        manager.write("local://x.txt", b"1").await.unwrap();
        manager.move_file("local://x.txt", "local://y/x.txt").await.unwrap();
        assert!(!manager.has("local://x.txt").await.unwrap());
        assert!(manager.has("local://y/x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_root_is_not_a_file() {
        let (local, storage) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let manager = manager(&local, &storage);

        assert!(matches!(
            manager.delete("storage://").await.unwrap_err(),
            StorageError::InvalidPath { .. }
        ));
        assert!(manager.list("storage://").await.unwrap().is_empty());
    }
}
