//! Sync command.
//!
//! Brings a destination file in line with a source file by rewriting only the
//! records whose block-map identity differs.

use std::{path::PathBuf, time::Duration};

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::{
   Result,
   engine::{SyncEngine, SyncOptions},
   stats::SyncReport,
   util::{format_duration, format_rate, format_size},
   zfs::Zfs,
};

/// Output switches for the sync command.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
   pub json:     bool,
   pub progress: bool,
}

/// Executes the sync command against the given ZFS backend.
pub async fn execute<Z: Zfs>(
   zfs: Z,
   src: PathBuf,
   dst: PathBuf,
   options: SyncOptions,
   output: OutputOptions,
) -> Result<()> {
   let engine = SyncEngine::new(zfs);

   let report = if output.progress && !output.json && !options.dry_run {
      let mut bar = progress_bar();
      let report = engine.run(&src, &dst, &options, &mut bar).await;
      bar.finish_and_clear();
      report?
   } else {
      engine.run(&src, &dst, &options, &mut ()).await?
   };

   if output.json {
      println!("{}", serde_json::to_string_pretty(&report)?);
   } else {
      print_report(&report);
   }
   Ok(())
}

fn progress_bar() -> ProgressBar {
   let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
   if let Ok(style) = ProgressStyle::default_bar()
      .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} records ({eta})")
   {
      bar.set_style(style.progress_chars("=> "));
   }
   bar.enable_steady_tick(Duration::from_millis(100));
   bar
}

/// Prints the human-readable run summary.
pub fn print_report(report: &SyncReport) {
   let mode = if report.mode_forced {
      format!("{} (forced, no shared ancestry)", report.mode)
   } else {
      report.mode.to_string()
   };

   println!(
      "{} {} -> {}",
      style(if report.dry_run { "Dry run:" } else { "Synced:" }).bold(),
      report.source.display(),
      report.destination.display()
   );
   if report.destination_created {
      println!("  {}", style("destination created").dim());
   }
   println!(
      "  {} {} ({} records), {} {} ({} records), recordsize {}",
      style("source").dim(),
      format_size(report.source_size),
      report.source_records,
      style("destination").dim(),
      format_size(report.destination_size),
      report.destination_records,
      format_size(report.record_size)
   );
   println!("  {} {}", style("compare").dim(), mode);
   println!(
      "  {} {} in {} ({})",
      style("scan").dim(),
      format_size(report.total_bytes()),
      format_duration(report.scan.elapsed),
      format_rate(report.scan.throughput())
   );
   println!(
      "  {} {} records, {} ({:.1}% of source)",
      style("differ").dim(),
      report.diff_records,
      format_size(report.planned_bytes),
      report.diff_ratio() * 100.0
   );

   if let (Some(copy), Some(stats)) = (report.copy, report.stats) {
      println!(
         "  {} {} records, {} in {} ({})",
         style("written").dim(),
         stats.written,
         format_size(stats.bytes_written),
         format_duration(copy.elapsed),
         format_rate(copy.throughput())
      );
      if stats.skipped > 0 {
         println!(
            "  {} {} records, {} already identical",
            style("skipped").dim(),
            stats.skipped,
            format_size(stats.bytes_skipped)
         );
      }
   }

   if report.diff_records == 0 && report.source_size == report.destination_size {
      println!("{}", style("✓ Already in sync").green());
   } else if !report.dry_run {
      println!("{}", style("✓ Done").green());
   }
}
