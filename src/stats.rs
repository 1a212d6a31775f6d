//! Timing and volume figures for a run.

use std::{path::PathBuf, time::Duration};

use serde::Serialize;

use crate::record::CompareMode;

/// Wall time spent in a phase and the byte volume it covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseTiming {
   #[serde(serialize_with = "serialize_secs")]
   pub elapsed: Duration,
   pub bytes:   u64,
}

impl PhaseTiming {
   pub const fn new(elapsed: Duration, bytes: u64) -> Self {
      Self { elapsed, bytes }
   }

   /// Bytes per second, `None` when the phase took no measurable time.
   pub fn throughput(&self) -> Option<f64> {
      let secs = self.elapsed.as_secs_f64();
      (secs > 0.0).then(|| self.bytes as f64 / secs)
   }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
   s.serialize_f64(d.as_secs_f64())
}

/// Outcome of the write phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CopyStats {
   /// Records in the diff set.
   pub planned:       usize,
   /// Records actually written.
   pub written:       usize,
   /// Records skipped because the destination already held the same bytes.
   pub skipped:       usize,
   pub bytes_written: u64,
   pub bytes_skipped: u64,
}

impl CopyStats {
   pub const fn record_write(&mut self, bytes: u64) {
      self.written += 1;
      self.bytes_written += bytes;
   }

   pub const fn record_skip(&mut self, bytes: u64) {
      self.skipped += 1;
      self.bytes_skipped += bytes;
   }
}

/// Summary of one synchronization run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
   pub source:               PathBuf,
   pub destination:          PathBuf,
   pub source_size:          u64,
   /// Destination size before the run.
   pub destination_size:     u64,
   pub record_size:          u64,
   pub mode:                 CompareMode,
   /// Address comparison was requested but not possible.
   pub mode_forced:          bool,
   pub dry_run:              bool,
   pub destination_created:  bool,
   pub source_records:       usize,
   pub destination_records:  usize,
   pub diff_records:         usize,
   pub planned_bytes:        u64,
   pub scan:                 PhaseTiming,
   pub copy:                 Option<PhaseTiming>,
   pub stats:                Option<CopyStats>,
}

impl SyncReport {
   /// Combined size of both files, the volume each phase is measured against.
   pub const fn total_bytes(&self) -> u64 {
      self.source_size + self.destination_size
   }

   /// Fraction of the source that had to be rewritten, in `0.0..=1.0`.
   pub fn diff_ratio(&self) -> f64 {
      if self.source_size == 0 {
         return 0.0;
      }
      (self.planned_bytes as f64 / self.source_size as f64).min(1.0)
   }

   /// Records written; zero for a dry run.
   pub fn records_written(&self) -> usize {
      self.stats.map_or(0, |s| s.written)
   }
}
