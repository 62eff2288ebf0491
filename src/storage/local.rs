//! Local Filesystem Backend
//!
//! Stores files under a root directory, one file per relative path.
//! Writes go through a temp file in the target directory and are persisted
//! without clobbering, so readers never observe a partial file.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, trace};

use super::errors::{StorageError, StorageResult};
use super::{Entry, EntryKind, Filesystem, RelativePath};

/// Name prefix of in-flight temp files, hidden from listings
const TEMP_PREFIX: &str = ".relocator-";

/// Backend rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    /// Root directory all relative paths resolve under
    root: PathBuf,
}

impl LocalFilesystem {
    /// Create a backend over an existing directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative path to its location on disk
    fn full_path(&self, path: &RelativePath) -> PathBuf {
        path.segments()
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    async fn ensure_parent(&self, path: &RelativePath) -> StorageResult<()> {
        let parent = self.full_path(&path.parent());
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| StorageError::io(path.as_str(), e))
    }

    /// Write `data` to a temp file beside `target`, then link it into place
    fn persist_new(target: PathBuf, data: Vec<u8>) -> std::io::Result<()> {
        let parent = target.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(parent)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&target).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn exists(&self, path: &RelativePath) -> StorageResult<bool> {
        match fs::metadata(self.full_path(path)).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(path.as_str(), e)),
        }
    }

    async fn read(&self, path: &RelativePath) -> StorageResult<Vec<u8>> {
        let data = fs::read(self.full_path(path))
            .await
            .map_err(|e| StorageError::io(path.as_str(), e))?;
        trace!(path = %path, size = data.len(), "Read local file");
        Ok(data)
    }

    async fn write(&self, path: &RelativePath, data: &[u8]) -> StorageResult<()> {
        self.ensure_parent(path).await?;

        let target = self.full_path(path);
        let bytes = data.to_vec();
        tokio::task::spawn_blocking(move || Self::persist_new(target, bytes))
            .await
            .map_err(|e| StorageError::io(path.as_str(), std::io::Error::other(e)))?
            .map_err(|e| StorageError::io(path.as_str(), e))?;

        debug!(path = %path, size = data.len(), root = %self.root.display(), "Wrote local file");
        Ok(())
    }

    async fn delete(&self, path: &RelativePath) -> StorageResult<()> {
        fs::remove_file(self.full_path(path))
            .await
            .map_err(|e| StorageError::io(path.as_str(), e))?;
        debug!(path = %path, root = %self.root.display(), "Deleted local file");
        Ok(())
    }

    async fn copy(&self, from: &RelativePath, to: &RelativePath) -> StorageResult<()> {
        let data = self.read(from).await?;
        self.write(to, &data).await
    }

    async fn rename(&self, from: &RelativePath, to: &RelativePath) -> StorageResult<()> {
        if !self.exists(from).await? {
            return Err(StorageError::NotFound(from.to_string()));
        }
        if self.exists(to).await? {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        self.ensure_parent(to).await?;
        fs::rename(self.full_path(from), self.full_path(to))
            .await
            .map_err(|e| StorageError::io(from.as_str(), e))?;
        debug!(from = %from, to = %to, "Renamed local file");
        Ok(())
    }

    async fn list(&self, dir: &RelativePath) -> StorageResult<Vec<Entry>> {
        let dir_path = self.full_path(dir);
        let mut read_dir = match fs::read_dir(&dir_path).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(dir.as_str(), e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| StorageError::io(dir.as_str(), e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Skip in-flight temp files from concurrent writes
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io(dir.as_str(), e))?;

            let child = if dir.is_root() {
                name
            } else {
                format!("{}/{}", dir, name)
            };
            let (kind, size) = if metadata.is_dir() {
                (EntryKind::Directory, 0)
            } else {
                (EntryKind::File, metadata.len())
            };
            entries.push(Entry {
                path: RelativePath::parse(&child)?,
                kind,
                size,
            });
        }

        entries.sort_by(|a, b| a.path.as_str().cmp(b.path.as_str()));
        debug!(dir = %dir, count = entries.len(), "Listed local directory");
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
