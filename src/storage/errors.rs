//! Storage Error Types
//!
//! Errors raised by `Filesystem` implementations. The relocator classifies
//! these at the operation boundary; nothing here is fatal on its own.

use crate::b2::B2Error;

/// Filesystem-level error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A cross-mount move wrote the destination but could not delete the source
    #[error("Copied to {to} but the source was not removed: {source}")]
    SourceNotRemoved {
        to: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Remote error on {path}: {source}")]
    Remote {
        path: String,
        #[source]
        source: B2Error,
    },
}

impl StorageError {
    /// Classify an io::Error raised while touching `path`
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path),
            std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path),
            _ => StorageError::Io { path, source },
        }
    }

    /// Classify a B2 error raised while touching `path`
    pub fn remote(path: impl Into<String>, source: B2Error) -> Self {
        let path = path.into();
        match source {
            B2Error::NotFound(_) => StorageError::NotFound(path),
            source => StorageError::Remote { path, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_classification() {
        let err = StorageError::io("a/b.txt", Error::new(ErrorKind::NotFound, "gone"));
        assert!(err.is_not_found());

        let err = StorageError::io("a/b.txt", Error::new(ErrorKind::AlreadyExists, "there"));
        assert!(matches!(err, StorageError::AlreadyExists(ref p) if p == "a/b.txt"));

        let err = StorageError::io("a/b.txt", Error::new(ErrorKind::PermissionDenied, "no"));
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn test_remote_classification() {
        let err = StorageError::remote("x.txt", B2Error::NotFound("x.txt".into()));
        assert!(err.is_not_found());

        let err = StorageError::remote("x.txt", B2Error::RateLimited);
        assert!(matches!(err, StorageError::Remote { .. }));
        assert!(err.to_string().contains("x.txt"));
    }
}
