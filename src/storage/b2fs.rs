//! B2 Filesystem Backend
//!
//! Exposes one Backblaze B2 bucket through the `Filesystem` trait.
//! File names in the bucket are the relative paths themselves; directories
//! are virtual and come from delimiter listings.

use async_trait::async_trait;
use tracing::debug;

use super::errors::{StorageError, StorageResult};
use super::{Entry, EntryKind, Filesystem, RelativePath};
use crate::b2::{B2Client, B2Error, FileInfo};

/// Backend over an authorized B2 client
pub struct B2Filesystem {
    /// B2 API client bound to a bucket
    client: B2Client,
}

impl B2Filesystem {
    pub fn new(client: B2Client) -> Self {
        Self { client }
    }

    /// Live file version at `path`, `NotFound` otherwise
    async fn live_file(&self, path: &RelativePath) -> StorageResult<FileInfo> {
        self.client
            .find_file(path.as_str())
            .await
            .map_err(|e| StorageError::remote(path.as_str(), e))?
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn file_id<'a>(path: &RelativePath, info: &'a FileInfo) -> StorageResult<&'a str> {
        info.file_id
            .as_deref()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn ensure_absent(&self, path: &RelativePath) -> StorageResult<()> {
        if self.exists(path).await? {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }
}

/// Whether a name is visible, given its versions newest first
///
/// A hide marker on top masks every older upload.
fn is_visible(versions: &[FileInfo]) -> bool {
    versions.first().map_or(false, FileInfo::is_live_file)
}

/// Ids of every version (uploads and hide markers) to remove for a full delete
fn version_ids(versions: &[FileInfo]) -> Vec<&str> {
    versions.iter().filter_map(|v| v.file_id.as_deref()).collect()
}

/// Map one delimiter-listing result onto an entry
fn to_entry(info: &FileInfo) -> Option<Entry> {
    let trimmed = info.file_name.trim_end_matches('/');
    let path = RelativePath::parse(trimmed).ok()?;
    if info.is_directory() {
        Some(Entry {
            path,
            kind: EntryKind::Directory,
            size: 0,
        })
    } else if info.is_live_file() {
        Some(Entry {
            path,
            kind: EntryKind::File,
            size: info.content_length,
        })
    } else {
        None
    }
}

#[async_trait]
impl Filesystem for B2Filesystem {
    async fn exists(&self, path: &RelativePath) -> StorageResult<bool> {
        let found = self
            .client
            .find_file(path.as_str())
            .await
            .map_err(|e| StorageError::remote(path.as_str(), e))?;
        Ok(found.is_some())
    }

    async fn read(&self, path: &RelativePath) -> StorageResult<Vec<u8>> {
        self.client
            .download_file(path.as_str())
            .await
            .map_err(|e| StorageError::remote(path.as_str(), e))
    }

    async fn write(&self, path: &RelativePath, data: &[u8]) -> StorageResult<()> {
        self.ensure_absent(path).await?;
        self.client
            .upload_file(path.as_str(), data)
            .await
            .map_err(|e| StorageError::remote(path.as_str(), e))?;
        Ok(())
    }

    async fn delete(&self, path: &RelativePath) -> StorageResult<()> {
        // Buckets keep history; removing only the newest upload would bring
        // the previous one back
        let versions = self
            .client
            .list_file_versions(path.as_str())
            .await
            .map_err(|e| StorageError::remote(path.as_str(), e))?;
        if !is_visible(&versions) {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let mut removed = 0;
        for file_id in version_ids(&versions) {
            match self.client.delete_file(path.as_str(), file_id).await {
                Ok(()) => removed += 1,
                Err(B2Error::NotFound(_)) => {
                    debug!(path = %path, file_id = file_id, "Version already gone");
                }
                Err(e) => return Err(StorageError::remote(path.as_str(), e)),
            }
        }

        if removed == 0 {
            return Err(StorageError::NotFound(path.to_string()));
        }
        debug!(path = %path, versions = removed, "Deleted all versions from B2");
        Ok(())
    }

    async fn copy(&self, from: &RelativePath, to: &RelativePath) -> StorageResult<()> {
        let info = self.live_file(from).await?;
        let file_id = Self::file_id(from, &info)?;
        self.ensure_absent(to).await?;
        self.client
            .copy_file(file_id, to.as_str())
            .await
            .map_err(|e| StorageError::remote(to.as_str(), e))?;
        Ok(())
    }

    async fn rename(&self, from: &RelativePath, to: &RelativePath) -> StorageResult<()> {
        // B2 has no rename; copy server-side then drop the source version
        self.copy(from, to).await?;
        self.delete(from).await
    }

    async fn list(&self, dir: &RelativePath) -> StorageResult<Vec<Entry>> {
        let prefix = if dir.is_root() {
            None
        } else {
            Some(format!("{}/", dir))
        };

        let files = self
            .client
            .list_file_names(prefix.as_deref(), Some("/"))
            .await
            .map_err(|e| StorageError::remote(dir.as_str(), e))?;

        let entries: Vec<Entry> = files
            .iter()
            // The folder marker for the directory itself is not a child
            .filter(|f| Some(f.file_name.as_str()) != prefix.as_deref())
            .filter_map(to_entry)
            .collect();

        debug!(dir = %dir, count = entries.len(), bucket = self.client.bucket_name(), "Listed B2 directory");
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!(
            "b2:{} ({})",
            self.client.bucket_name(),
            self.client.health_status()
        )
    }
}
