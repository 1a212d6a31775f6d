//! Record-level differential synchronization for files on ZFS.
//!
//! A run scans the block maps of a source and a destination file, compares
//! them record by record (by block address or by checksum) and rewrites only
//! the destination records that differ, then resizes the destination to the
//! source length.

pub mod apply;
pub mod blockmap;
pub mod cmd;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod record;
pub mod stats;
pub mod util;
pub mod zfs;

pub use error::{Error, Result};
