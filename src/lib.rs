//! Relocator - moves files from a local backend into long-term storage
//!
//! Backends are plain directories or Backblaze B2 buckets, addressed through a
//! small `Filesystem` trait and mounted side by side as `local://` and
//! `storage://`.

pub mod b2;
pub mod config;
pub mod mount;
pub mod relocator;
pub mod resolver;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BackendConfig, ConfigError, RelocatorConfig};
pub use relocator::{Outcome, Relocator};
pub use resolver::{BackendResolver, ConfigResolver, ResolveError, StaticResolver};
pub use storage::{Filesystem, RelativePath, StorageError};
