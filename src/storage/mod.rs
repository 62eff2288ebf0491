//! Storage backend abstraction
//!
//! A `Filesystem` is one named storage target: a local directory or a remote
//! bucket. All paths are `RelativePath`s against the backend root, so the same
//! path addresses a file independently in every backend.

pub mod b2fs;
pub mod errors;
pub mod local;
pub mod path;

use async_trait::async_trait;

pub use b2fs::B2Filesystem;
pub use errors::{StorageError, StorageResult};
pub use local::LocalFilesystem;
pub use path::RelativePath;

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One immediate child returned by `Filesystem::list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full path relative to the backend root
    pub path: RelativePath,
    /// File or directory
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

/// Capabilities every storage backend exposes
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Check whether a file exists at `path`
    async fn exists(&self, path: &RelativePath) -> StorageResult<bool>;

    /// Read the whole file
    async fn read(&self, path: &RelativePath) -> StorageResult<Vec<u8>>;

    /// Create a new file
    ///
    /// Fails with `AlreadyExists` if a file is present at `path`; callers that
    /// want overwrite semantics delete first.
    async fn write(&self, path: &RelativePath, data: &[u8]) -> StorageResult<()>;

    /// Delete a file, `NotFound` if absent
    async fn delete(&self, path: &RelativePath) -> StorageResult<()>;

    /// Copy a file within this backend
    async fn copy(&self, from: &RelativePath, to: &RelativePath) -> StorageResult<()>;

    /// Move a file within this backend
    async fn rename(&self, from: &RelativePath, to: &RelativePath) -> StorageResult<()>;

    /// List the immediate children of a directory
    async fn list(&self, dir: &RelativePath) -> StorageResult<Vec<Entry>>;

    /// Human-readable identity for logs
    fn describe(&self) -> String;
}
