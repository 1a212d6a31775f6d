#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{
   collections::{HashMap, HashSet},
   fs::File,
   io::{Seek, SeekFrom, Write},
   os::unix::{fs::MetadataExt, process::ExitStatusExt},
   path::{Path, PathBuf},
   process::ExitStatus,
   sync::{
      Mutex,
      atomic::{AtomicUsize, Ordering},
   },
};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use zrecsync::{
   Error, Result,
   zfs::{FileMeta, ScanTarget, Volume, Zfs},
};

pub const RECORD_SIZE: u64 = 4096;

/// In-memory stand-in for the ZFS tools.
///
/// Each dataset is a directory under a temp dir. Block maps are synthesized
/// from the file content: all-zero records become holes, everything else gets
/// a SHA-256 checksum and an address derived from it.
pub struct FakeZfs {
   pub volumes:      Vec<Volume>,
   pub origins:      HashMap<String, String>,
   pub record_sizes: HashMap<String, u64>,
   /// Files whose records at these offsets are dumped without a checksum.
   pub unknown:      Mutex<HashMap<PathBuf, HashSet<u64>>>,
   /// Scanning these files fails the way `zdb` would.
   pub failing:      HashSet<PathBuf>,
   pub flushes:      AtomicUsize,
   pub scans:        AtomicUsize,
}

impl FakeZfs {
   pub fn new(volumes: Vec<Volume>) -> Self {
      Self {
         volumes,
         origins: HashMap::new(),
         record_sizes: HashMap::new(),
         unknown: Mutex::new(HashMap::new()),
         failing: HashSet::new(),
         flushes: AtomicUsize::new(0),
         scans: AtomicUsize::new(0),
      }
   }

   pub fn mark_unknown(&self, path: &Path, offset: u64) {
      let path = path.canonicalize().expect("canonical path");
      self
         .unknown
         .lock()
         .expect("unknown lock")
         .entry(path)
         .or_default()
         .insert(offset);
   }

   fn record_size(&self, dataset: &str) -> u64 {
      self.record_sizes.get(dataset).copied().unwrap_or(RECORD_SIZE)
   }
}

/// One dataset `tank/<name>` mounted at `<tmp>/<name>`.
pub fn dataset(tmp: &TempDir, name: &str) -> Volume {
   let mountpoint = tmp.path().join(name);
   std::fs::create_dir_all(&mountpoint).expect("create mountpoint");
   Volume {
      dataset:    format!("tank/{name}"),
      mountpoint: mountpoint.canonicalize().expect("canonical mountpoint"),
   }
}

/// Builds `records` of `RECORD_SIZE` bytes, each filled with its fill byte.
pub fn content(records: &[u8]) -> Vec<u8> {
   records
      .iter()
      .flat_map(|&b| std::iter::repeat_n(b, RECORD_SIZE as usize))
      .collect()
}

pub fn write_file(path: &Path, data: &[u8]) {
   std::fs::write(path, data).expect("write file");
}

pub fn checksum(data: &[u8]) -> String {
   let digest = hex::encode(Sha256::digest(data));
   format!("{}:{}:{}:{}", &digest[..16], &digest[16..32], &digest[32..48], &digest[48..])
}

/// Renders a `zdb -ddddd` style dump for the given content.
pub fn render_dump(data: &[u8], record_size: u64, unknown: &HashSet<u64>) -> String {
   let mut out = String::from(
      "Dataset tank/fs [ZPL], ID 54, cr_txg 6, 1.2M, 7 objects\n\n    Object  lvl   iblk   \
       dblk  dsize  dnsize  lsize   %full  type\n Indirect blocks:\n",
   );
   out.push_str(&format!(
      "               0 L1  0:1c00:400 {record_size:x}L/400P F=2 B=8/8 cksum=aa:bb:cc:dd\n"
   ));

   for (i, chunk) in data.chunks(record_size as usize).enumerate() {
      let offset = i as u64 * record_size;
      if unknown.contains(&offset) {
         out.push_str(&format!("{offset:>16x}  L0 EMBEDDED et=0 {record_size:x}L/18P B=8\n"));
      } else if chunk.iter().all(|&b| b == 0) {
         out.push_str(&format!("{offset:>16x}  L0 0:0:0 {record_size:x}L B=8\n"));
      } else {
         let cksum = checksum(chunk);
         let dva = format!("0:{}:{record_size:x}", &cksum[..12]);
         out.push_str(&format!(
            "{offset:>16x}  L0 {dva} {record_size:x}L/{record_size:x}P F=1 B=8/8 cksum={cksum}\n"
         ));
      }
   }

   out.push_str("\n\t\tsegment [0000000000000000, 0000000000002000) size    8K\n");
   out
}

#[async_trait::async_trait]
impl Zfs for FakeZfs {
   async fn resolve_volume(&self, path: &Path) -> Result<Volume> {
      let canonical = path.canonicalize()?;
      self
         .volumes
         .iter()
         .find(|v| canonical.starts_with(&v.mountpoint))
         .cloned()
         .ok_or_else(|| Error::ToolOutput { tool: "zfs".into(), output: "not a ZFS path".into() })
   }

   async fn file_meta(&self, path: &Path) -> Result<FileMeta> {
      let meta = std::fs::metadata(path)?;
      let volume = self.resolve_volume(path).await?;
      Ok(FileMeta {
         inode:       meta.ino(),
         size:        meta.len(),
         record_size: self.record_size(&volume.dataset),
      })
   }

   async fn origin(&self, dataset: &str) -> Result<Option<String>> {
      Ok(self.origins.get(dataset).cloned())
   }

   async fn flush(&self) -> Result<()> {
      self.flushes.fetch_add(1, Ordering::SeqCst);
      Ok(())
   }

   async fn dump_block_map(&self, target: &ScanTarget<'_>) -> Result<File> {
      self.scans.fetch_add(1, Ordering::SeqCst);
      let path = target.volume.mountpoint.join(target.relative);
      if self.failing.contains(&path) {
         return Err(Error::ExternalTool {
            tool:   "zdb".into(),
            status: ExitStatus::from_raw(256),
            stderr: "failed to hold dataset: No such file or directory".into(),
         });
      }

      let data = std::fs::read(&path)?;
      let unknown = self
         .unknown
         .lock()
         .expect("unknown lock")
         .get(&path)
         .cloned()
         .unwrap_or_default();
      let dump = render_dump(&data, self.record_size(&target.volume.dataset), &unknown);

      let mut out = tempfile::tempfile()?;
      out.write_all(dump.as_bytes())?;
      out.seek(SeekFrom::Start(0))?;
      Ok(out)
   }
}
