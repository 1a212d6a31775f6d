//! Access to the ZFS tooling the engine depends on.
//!
//! The engine only needs a handful of facts from the filesystem: which dataset
//! holds a file, the file's record size, dataset clone ancestry, a
//! transaction-group flush, and the block map of a file. [`Zfs`] is the seam
//! for all of them; [`ZfsCli`] implements it on top of the `zfs`, `zpool` and
//! `zdb` binaries.

mod cli;

use std::{
   fs::File,
   os::unix::fs::MetadataExt,
   path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

pub use self::cli::ZfsCli;
use crate::error::{Error, Result};

/// A mounted dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
   /// Dataset name, `pool/child/...`.
   pub dataset:    String,
   pub mountpoint: PathBuf,
}

impl Volume {
   pub fn pool(&self) -> &str {
      self.dataset.split('/').next().unwrap_or(&self.dataset)
   }
}

/// Per-file facts needed before scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
   pub inode:       u64,
   pub size:        u64,
   pub record_size: u64,
}

/// How `zdb` locates the object to dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectLookup {
   /// By object number, which is the file's inode number.
   #[default]
   Inode,
   /// By path relative to the dataset root.
   Path,
}

/// Identifies one file for block-map introspection.
#[derive(Debug, Clone)]
pub struct ScanTarget<'a> {
   pub volume:   &'a Volume,
   pub relative: &'a Path,
   pub inode:    u64,
}

#[async_trait::async_trait]
pub trait Zfs: Send + Sync {
   /// Returns the dataset holding `path` and its mountpoint.
   async fn resolve_volume(&self, path: &Path) -> Result<Volume>;

   /// Returns the inode, size and record size of a file.
   ///
   /// ZFS reports a file's block size as its preferred I/O size.
   async fn file_meta(&self, path: &Path) -> Result<FileMeta> {
      let meta = tokio::fs::metadata(path).await?;
      Ok(FileMeta { inode: meta.ino(), size: meta.len(), record_size: meta.blksize() })
   }

   /// Returns the snapshot a dataset was cloned from, if any.
   async fn origin(&self, dataset: &str) -> Result<Option<String>>;

   /// Forces pending transaction groups to stable storage.
   async fn flush(&self) -> Result<()>;

   /// Writes the block map of one file into a private temporary file, rewound
   /// to the start.
   async fn dump_block_map(&self, target: &ScanTarget<'_>) -> Result<File>;
}

/// Dataset part of a snapshot name (`pool/fs@snap` -> `pool/fs`).
fn snapshot_dataset(snapshot: &str) -> &str {
   snapshot.split_once('@').map_or(snapshot, |(ds, _)| ds)
}

/// Whether block addresses of the two datasets are comparable.
///
/// Addresses are pool-local, and only carry shared content when the datasets
/// are the same, one is a clone of the other, or both are clones of the same
/// dataset.
///
/// The source does not need an origin of its own: a pair within one dataset,
/// or a destination cloned from the source, keeps address comparison even
/// though the source has no snapshot ancestry. Addresses of unrelated blocks
/// never coincide, so the worst case is a diff that covers every record.
pub async fn shares_ancestry<Z: Zfs + ?Sized>(zfs: &Z, src: &Volume, dst: &Volume) -> Result<bool> {
   if src.pool() != dst.pool() {
      return Ok(false);
   }
   if src.dataset == dst.dataset {
      return Ok(true);
   }

   let src_origin = zfs.origin(&src.dataset).await?;
   let dst_origin = zfs.origin(&dst.dataset).await?;
   let src_parent = src_origin.as_deref().map(snapshot_dataset);
   let dst_parent = dst_origin.as_deref().map(snapshot_dataset);

   Ok(dst_parent == Some(src.dataset.as_str())
      || src_parent == Some(dst.dataset.as_str())
      || (src_parent.is_some() && src_parent == dst_parent))
}

/// Path of `path` relative to the root of `volume`.
pub fn relative_to_mount(path: &Path, volume: &Volume) -> Result<PathBuf> {
   let canonical = path.canonicalize()?;
   canonical
      .strip_prefix(&volume.mountpoint)
      .map(Path::to_path_buf)
      .map_err(|_| Error::NotOnVolume { path: canonical.clone(), mountpoint: volume.mountpoint.clone() })
}
