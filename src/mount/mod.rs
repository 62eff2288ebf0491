//! Unified mount namespace over named filesystems

pub mod manager;

pub use manager::{MountManager, MountPath};
