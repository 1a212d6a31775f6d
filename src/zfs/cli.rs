//! [`Zfs`] implementation backed by the ZFS command-line tools.

use std::{
   ffi::OsStr,
   fs::File,
   io::{Seek, SeekFrom},
   path::{Path, PathBuf},
   process::{ExitStatus, Stdio},
};

use tokio::process::Command;

use super::{ObjectLookup, ScanTarget, Volume, Zfs};
use crate::{
   config::Config,
   error::{Error, Result},
};

/// Runs `zfs`, `zpool` and `zdb` as subprocesses.
#[derive(Debug, Clone)]
pub struct ZfsCli {
   zfs:    PathBuf,
   zpool:  PathBuf,
   zdb:    PathBuf,
   lookup: ObjectLookup,
}

impl ZfsCli {
   pub fn new(zfs: PathBuf, zpool: PathBuf, zdb: PathBuf, lookup: ObjectLookup) -> Self {
      Self { zfs, zpool, zdb, lookup }
   }

   pub fn from_config(cfg: &Config) -> Self {
      Self::new(cfg.zfs_bin.clone(), cfg.zpool_bin.clone(), cfg.zdb_bin.clone(), cfg.object_lookup)
   }

   /// Binaries this backend invokes, for diagnostics.
   pub fn binaries(&self) -> [&Path; 3] {
      [&self.zfs, &self.zpool, &self.zdb]
   }

   /// Arguments for dumping the indirect blocks of one file.
   fn zdb_args<'a>(&self, target: &'a ScanTarget<'_>, inode: &'a str) -> Vec<&'a OsStr> {
      let dataset = OsStr::new(target.volume.dataset.as_str());
      match self.lookup {
         ObjectLookup::Inode => vec![OsStr::new("-ddddd"), dataset, OsStr::new(inode)],
         ObjectLookup::Path => {
            vec![OsStr::new("-vvvvv"), OsStr::new("-O"), dataset, target.relative.as_os_str()]
         },
      }
   }
}

fn tool_name(program: &Path) -> String {
   program
      .file_name()
      .unwrap_or(program.as_os_str())
      .to_string_lossy()
      .into_owned()
}

/// Any stderr output or a failed exit status is fatal.
fn check_status(program: &Path, status: ExitStatus, stderr: &[u8]) -> Result<()> {
   let stderr = String::from_utf8_lossy(stderr);
   let stderr = stderr.trim();
   if !stderr.is_empty() || !status.success() {
      return Err(Error::ExternalTool { tool: tool_name(program), status, stderr: stderr.to_string() });
   }
   Ok(())
}

/// Runs a tool to completion and returns its stdout.
async fn run_captured(program: &Path, args: &[&OsStr]) -> Result<String> {
   tracing::debug!("running {} {:?}", program.display(), args);
   let output = Command::new(program)
      .args(args)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|source| Error::Spawn { tool: tool_name(program), source })?;

   check_status(program, output.status, &output.stderr)?;
   Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_volume(tool: &str, output: &str) -> Result<Volume> {
   let bad_output = || Error::ToolOutput { tool: tool.to_string(), output: output.trim().to_string() };

   let line = output.lines().next().ok_or_else(bad_output)?;
   let (dataset, mountpoint) = line.split_once('\t').ok_or_else(bad_output)?;
   let mountpoint = PathBuf::from(mountpoint.trim());
   if dataset.is_empty() || !mountpoint.is_absolute() {
      return Err(bad_output());
   }
   Ok(Volume { dataset: dataset.to_string(), mountpoint })
}

#[async_trait::async_trait]
impl Zfs for ZfsCli {
   async fn resolve_volume(&self, path: &Path) -> Result<Volume> {
      let output = run_captured(&self.zfs, &[
         OsStr::new("list"),
         OsStr::new("-H"),
         OsStr::new("-p"),
         OsStr::new("-o"),
         OsStr::new("name,mountpoint"),
         path.as_os_str(),
      ])
      .await?;
      parse_volume(&tool_name(&self.zfs), &output)
   }

   async fn origin(&self, dataset: &str) -> Result<Option<String>> {
      let output = run_captured(&self.zfs, &[
         OsStr::new("get"),
         OsStr::new("-H"),
         OsStr::new("-p"),
         OsStr::new("-o"),
         OsStr::new("value"),
         OsStr::new("origin"),
         OsStr::new(dataset),
      ])
      .await?;
      let origin = output.trim();
      Ok((!origin.is_empty() && origin != "-").then(|| origin.to_string()))
   }

   async fn flush(&self) -> Result<()> {
      run_captured(&self.zpool, &[OsStr::new("sync")]).await?;
      Ok(())
   }

   async fn dump_block_map(&self, target: &ScanTarget<'_>) -> Result<File> {
      let inode = target.inode.to_string();
      let args = self.zdb_args(target, &inode);
      tracing::debug!("running {} {:?}", self.zdb.display(), args);

      let mut out = tempfile::tempfile()?;
      let child = Command::new(&self.zdb)
         .args(&args)
         .stdin(Stdio::null())
         .stdout(Stdio::from(out.try_clone()?))
         .stderr(Stdio::piped())
         .kill_on_drop(true)
         .spawn()
         .map_err(|source| Error::Spawn { tool: tool_name(&self.zdb), source })?;

      let output = child.wait_with_output().await?;
      check_status(&self.zdb, output.status, &output.stderr)?;

      out.seek(SeekFrom::Start(0))?;
      Ok(out)
   }
}
