//! Relative path addressing shared by every backend

use std::fmt;

use super::errors::{StorageError, StorageResult};

/// A validated, slash-separated path relative to a backend root.
///
/// The empty path names the root itself and is only produced by `parent()`;
/// `parse` rejects it since no file can live there.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativePath(String);

impl RelativePath {
    /// Normalize and validate a caller-supplied path
    ///
    /// Leading/trailing slashes, empty segments and `.` segments are dropped.
    /// `..` segments and NUL bytes are rejected.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let path = Self::normalize(raw)?;
        if path.0.is_empty() {
            return Err(StorageError::InvalidPath {
                path: raw.to_string(),
                reason: "path is empty",
            });
        }
        Ok(path)
    }

    /// Like `parse`, but accepts the root (used for directory listings)
    pub fn parse_dir(raw: &str) -> StorageResult<Self> {
        Self::normalize(raw)
    }

    /// The backend root
    pub fn root() -> Self {
        RelativePath(String::new())
    }

    fn normalize(raw: &str) -> StorageResult<Self> {
        if raw.contains('\0') {
            return Err(StorageError::InvalidPath {
                path: raw.to_string(),
                reason: "path contains a NUL byte",
            });
        }

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(StorageError::InvalidPath {
                        path: raw.to_string(),
                        reason: "parent segments are not allowed",
                    })
                }
                s => segments.push(s),
            }
        }

        Ok(RelativePath(segments.join("/")))
    }

    /// Directory containing this path (`a/b/c.txt` -> `a/b`, `c.txt` -> root)
    pub fn parent(&self) -> RelativePath {
        match self.0.rfind('/') {
            Some(pos) => RelativePath(self.0[..pos].to_string()),
            None => RelativePath::root(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over path components
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
