//! Write phase: copies the records of a diff set from source to destination.

use std::{fs::File, io, os::unix::fs::FileExt};

use indicatif::ProgressBar;

use crate::{diff::DiffSet, error::Result, stats::CopyStats};

/// Parameters of the write phase.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
   pub record_size: u64,
   /// Final length of the destination.
   pub source_size: u64,
   /// Read the destination first and skip writes that would not change it.
   pub optimize:    bool,
   /// Flush the destination to stable storage when done.
   pub fsync:       bool,
}

/// Progress updates from the write phase.
#[derive(Debug, Clone, Copy)]
pub struct ApplyUpdate {
   pub done:  usize,
   pub total: usize,
   pub bytes: u64,
}

/// Trait for receiving write-phase progress updates
pub trait ApplyProgress: Send {
   fn progress(&mut self, update: ApplyUpdate);
}

impl<F: FnMut(ApplyUpdate) + Send> ApplyProgress for F {
   fn progress(&mut self, update: ApplyUpdate) {
      self(update);
   }
}

impl ApplyProgress for () {
   fn progress(&mut self, _update: ApplyUpdate) {}
}

impl ApplyProgress for ProgressBar {
   fn progress(&mut self, update: ApplyUpdate) {
      self.update(|state| {
         state.set_len(update.total as u64);
         state.set_pos(update.done as u64);
      });
   }
}

/// Reads until `buf` is full or end of file; returns the bytes read.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
   let mut filled = 0;
   while filled < buf.len() {
      match file.read_at(&mut buf[filled..], offset + filled as u64) {
         Ok(0) => break,
         Ok(n) => filled += n,
         Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
         Err(e) => return Err(e),
      }
   }
   Ok(filled)
}

/// Writes every record in `diff` from `source` to `destination`, then resizes
/// the destination to the source length.
///
/// Offsets are processed in ascending order. A record cut short by the end of
/// the source is written as far as it goes; the final resize covers the rest.
/// Nothing is rolled back if an I/O error stops the loop part way.
pub fn apply(
   diff: &DiffSet,
   source: &File,
   destination: &File,
   options: ApplyOptions,
   progress: &mut dyn ApplyProgress,
) -> Result<CopyStats> {
   let record_size = options.record_size as usize;
   let mut src_buf = vec![0u8; record_size];
   let mut dst_buf = vec![0u8; if options.optimize { record_size } else { 0 }];
   let mut stats = CopyStats { planned: diff.len(), ..CopyStats::default() };
   let total = diff.len();

   for (done, offset) in diff.iter().enumerate() {
      let n = read_full_at(source, &mut src_buf, offset)?;
      if n > 0 {
         let data = &src_buf[..n];
         let unchanged = options.optimize && {
            let m = read_full_at(destination, &mut dst_buf[..n], offset)?;
            m == n && dst_buf[..n] == *data
         };

         if unchanged {
            stats.record_skip(n as u64);
         } else {
            destination.write_all_at(data, offset)?;
            stats.record_write(n as u64);
         }
      } else {
         tracing::debug!("offset {offset} is past the end of the source, nothing to copy");
         stats.record_skip(0);
      }

      progress.progress(ApplyUpdate { done: done + 1, total, bytes: stats.bytes_written });
   }

   destination.set_len(options.source_size)?;
   if options.fsync {
      destination.sync_all()?;
   }

   tracing::debug!(
      "write phase done: {} written, {} skipped, {} bytes",
      stats.written,
      stats.skipped,
      stats.bytes_written
   );
   Ok(stats)
}
