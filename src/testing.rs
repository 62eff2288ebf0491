//! Fault injection for relocator tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage::{Entry, Filesystem, LocalFilesystem, RelativePath, StorageError, StorageResult};

/// Error to raise instead of running an operation
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    NotFound,
    Io,
}

/// Local filesystem that records calls and fails selected operations
pub struct FaultyFilesystem {
    inner: LocalFilesystem,
    faults: Mutex<HashMap<&'static str, Fault>>,
    calls: Mutex<Vec<String>>,
    /// Report every file as present
    phantom: AtomicBool,
}

impl FaultyFilesystem {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalFilesystem::new(root),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            phantom: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, operation: &'static str, fault: Fault) {
        self.faults.lock().unwrap().insert(operation, fault);
    }

    pub fn phantom_exists(&self) {
        self.phantom.store(true, Ordering::SeqCst);
    }

    /// Calls so far as `operation:path`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, operation: &'static str, path: &RelativePath) -> StorageResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", operation, path));

        match self.faults.lock().unwrap().get(operation) {
            None => Ok(()),
            Some(Fault::NotFound) => Err(StorageError::NotFound(path.to_string())),
            Some(Fault::Io) => Err(StorageError::io(
                path.as_str(),
                std::io::Error::new(std::io::ErrorKind::Other, format!("injected {} failure", operation)),
            )),
        }
    }
}

#[async_trait]
impl Filesystem for FaultyFilesystem {
    async fn exists(&self, path: &RelativePath) -> StorageResult<bool> {
        self.enter("exists", path)?;
        if self.phantom.load(Ordering::SeqCst) {
            return Ok(true);
        }
        self.inner.exists(path).await
    }

    async fn read(&self, path: &RelativePath) -> StorageResult<Vec<u8>> {
        self.enter("read", path)?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &RelativePath, data: &[u8]) -> StorageResult<()> {
        self.enter("write", path)?;
        self.inner.write(path, data).await
    }

    async fn delete(&self, path: &RelativePath) -> StorageResult<()> {
        self.enter("delete", path)?;
        self.inner.delete(path).await
    }

    async fn copy(&self, from: &RelativePath, to: &RelativePath) -> StorageResult<()> {
        self.enter("copy", from)?;
        self.inner.copy(from, to).await
    }

    async fn rename(&self, from: &RelativePath, to: &RelativePath) -> StorageResult<()> {
        self.enter("rename", from)?;
        self.inner.rename(from, to).await
    }

    async fn list(&self, dir: &RelativePath) -> StorageResult<Vec<Entry>> {
        self.enter("list", dir)?;
        self.inner.list(dir).await
    }

    fn describe(&self) -> String {
        format!("faulty {}", self.inner.describe())
    }
}
