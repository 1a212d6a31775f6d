//! Scan, compare and write pipeline for one source/destination pair.

use std::{
   fs::{File, OpenOptions},
   io::BufReader,
   path::Path,
   time::Instant,
};

use crate::{
   Result,
   apply::{self, ApplyOptions, ApplyProgress},
   blockmap,
   diff::{self, DiffSet},
   error::Error,
   record::{CompareMode, FileState},
   stats::{CopyStats, PhaseTiming, SyncReport},
   zfs::{self, ScanTarget, Zfs},
};

/// Options for a single run.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
   pub mode:              CompareMode,
   /// Scan and compare only; never touch the destination.
   pub dry_run:           bool,
   /// Read the destination before each write and skip identical records.
   pub optimize:          bool,
   pub fsync:             bool,
   pub flush_before_scan: bool,
}

impl Default for SyncOptions {
   fn default() -> Self {
      Self {
         mode:              CompareMode::Address,
         dry_run:           false,
         optimize:          false,
         fsync:             true,
         flush_before_scan: true,
      }
   }
}

/// Result of the scan and compare phases.
#[derive(Debug)]
pub struct Plan {
   pub source:              FileState,
   pub destination:         FileState,
   pub mode:                CompareMode,
   pub mode_forced:         bool,
   /// The destination does not exist yet; the write phase creates it.
   pub destination_created: bool,
   pub diff:                DiffSet,
   pub scan:                PhaseTiming,
}

/// Engine for synchronizing a destination file with a source file
pub struct SyncEngine<Z: Zfs> {
   zfs: Z,
}

impl<Z: Zfs> SyncEngine<Z> {
   pub const fn new(zfs: Z) -> Self {
      Self { zfs }
   }

   pub const fn zfs(&self) -> &Z {
      &self.zfs
   }

   /// Runs the full pipeline: scan both files, compute the diff, write it.
   pub async fn run(
      &self,
      src: &Path,
      dst: &Path,
      options: &SyncOptions,
      progress: &mut dyn ApplyProgress,
   ) -> Result<SyncReport> {
      let plan = self.plan(src, dst, options).await?;

      let mut report = SyncReport {
         source:              plan.source.path.clone(),
         destination:         plan.destination.path.clone(),
         source_size:         plan.source.size,
         destination_size:    plan.destination.size,
         record_size:         plan.source.record_size,
         mode:                plan.mode,
         mode_forced:         plan.mode_forced,
         dry_run:             options.dry_run,
         destination_created: plan.destination_created,
         source_records:      plan.source.records.len(),
         destination_records: plan.destination.records.len(),
         diff_records:        plan.diff.len(),
         planned_bytes:       plan.diff.planned_bytes(plan.source.record_size, plan.source.size),
         scan:                plan.scan,
         copy:                None,
         stats:               None,
      };

      if options.dry_run {
         tracing::info!("dry run: {} of {} records differ", plan.diff.len(), plan.source.records.len());
         return Ok(report);
      }

      let started = Instant::now();
      let stats = write_plan(&plan, options, progress)?;
      let copy = PhaseTiming::new(started.elapsed(), report.total_bytes());
      tracing::info!(
         "copy phase: {} written, {} skipped in {:.3}s",
         stats.written,
         stats.skipped,
         copy.elapsed.as_secs_f64()
      );

      report.copy = Some(copy);
      report.stats = Some(stats);
      Ok(report)
   }

   /// Runs the precondition checks, scans both files and computes the diff.
   ///
   /// Never touches the destination. A missing destination is planned as an
   /// empty file and only created once the write phase starts.
   pub async fn plan(&self, src: &Path, dst: &Path, options: &SyncOptions) -> Result<Plan> {
      if !src.is_file() {
         return Err(Error::SourceMissing(src.to_path_buf()));
      }

      if !dst.exists() && options.dry_run {
         return Err(Error::DestinationMissing(dst.to_path_buf()));
      }

      let mut source = self.describe(src).await?;
      let destination_created = !dst.exists();
      let mut destination = if destination_created {
         FileState::new(dst.to_path_buf(), 0, source.record_size, 0)
      } else {
         let state = self.describe(dst).await?;
         diff::check_record_sizes(&source, &state)?;
         state
      };

      let mut mode = options.mode;
      let mut mode_forced = false;
      if mode == CompareMode::Address
         && !destination_created
         && let (Some(src_vol), Some(dst_vol)) = (&source.volume, &destination.volume)
         && !zfs::shares_ancestry(&self.zfs, src_vol, dst_vol).await?
      {
         tracing::warn!(
            "{} and {} share no snapshot ancestry; comparing by checksum instead of address",
            src_vol.dataset,
            dst_vol.dataset
         );
         mode = CompareMode::Hash;
         mode_forced = true;
      }

      if options.flush_before_scan {
         self.zfs.flush().await?;
      }

      let started = Instant::now();
      let (src_dump, dst_dump) = if destination_created {
         (self.dump(&source).await?, None)
      } else {
         let (s, d) = tokio::try_join!(self.dump(&source), self.dump(&destination))?;
         (s, Some(d))
      };

      source.records = blockmap::read_record_map(BufReader::new(src_dump), mode, source.size)?;
      if let Some(dump) = dst_dump {
         destination.records = blockmap::read_record_map(BufReader::new(dump), mode, destination.size)?;
      }
      let scan = PhaseTiming::new(started.elapsed(), source.size + destination.size);
      tracing::info!(
         "scan phase: {} source records, {} destination records in {:.3}s",
         source.records.len(),
         destination.records.len(),
         scan.elapsed.as_secs_f64()
      );

      let diff = diff::compare(&source.records, &destination.records, source.size);
      Ok(Plan { source, destination, mode, mode_forced, destination_created, diff, scan })
   }

   /// Resolves volume and metadata for an existing file.
   async fn describe(&self, path: &Path) -> Result<FileState> {
      let meta = self.zfs.file_meta(path).await?;
      let volume = self.zfs.resolve_volume(path).await?;
      let relative = zfs::relative_to_mount(path, &volume)?;
      tracing::debug!(
         "{}: dataset {}, inode {}, {} bytes, recordsize {}",
         path.display(),
         volume.dataset,
         meta.inode,
         meta.size,
         meta.record_size
      );

      let mut state = FileState::new(path.to_path_buf(), meta.size, meta.record_size, meta.inode);
      state.volume = Some(volume);
      state.relative = Some(relative);
      Ok(state)
   }

   async fn dump(&self, state: &FileState) -> Result<File> {
      let (Some(volume), Some(relative)) = (&state.volume, &state.relative) else {
         return Err(Error::Unresolved(state.path.clone()));
      };
      let target = ScanTarget { volume, relative, inode: state.inode };
      self.zfs.dump_block_map(&target).await
   }

   /// Scans a single file into its record map without comparing anything.
   pub async fn scan(&self, path: &Path, mode: CompareMode) -> Result<FileState> {
      if !path.is_file() {
         return Err(Error::SourceMissing(path.to_path_buf()));
      }
      let mut state = self.describe(path).await?;
      let dump = self.dump(&state).await?;
      state.records = blockmap::read_record_map(BufReader::new(dump), mode, state.size)?;
      Ok(state)
   }
}

/// Executes the write phase of a plan.
fn write_plan(plan: &Plan, options: &SyncOptions, progress: &mut dyn ApplyProgress) -> Result<CopyStats> {
   let source = File::open(&plan.source.path)?;
   if plan.destination_created {
      tracing::info!("creating destination {}", plan.destination.path.display());
   }
   let destination = OpenOptions::new()
      .read(true)
      .write(true)
      .create_new(plan.destination_created)
      .open(&plan.destination.path)?;
   let apply_options = ApplyOptions {
      record_size: plan.source.record_size,
      source_size: plan.source.size,
      optimize:    options.optimize,
      fsync:       options.fsync,
   };
   apply::apply(&plan.diff, &source, &destination, apply_options, progress)
}

impl Plan {
   /// Whether the destination already matches the source.
   pub fn is_in_sync(&self) -> bool {
      self.diff.is_empty() && self.source.size == self.destination.size
   }
}
