//! System health check command.
//!
//! Verifies that the ZFS tools zrecsync shells out to can be executed, and
//! prints the effective configuration.

use std::{path::Path, process::Stdio};

use console::style;
use tokio::process::Command;

use crate::{Result, config, zfs::ZfsCli};

/// Executes the doctor command to check system health.
pub async fn execute() -> Result<()> {
   println!("{}\n", style("zrecsync Doctor").bold());

   let cfg = config::get();
   let cli = ZfsCli::from_config(cfg);

   let mut all_good = true;
   for bin in cli.binaries() {
      all_good &= check_binary(bin).await;
   }

   println!();
   let config_path = config::config_file_path();
   let symbol = if config_path.exists() {
      style("✓").green()
   } else {
      style("○").yellow()
   };
   println!("{} Config: {}", symbol, style(config_path.display()).dim());
   println!(
      "  {} mode={} lookup={:?} optimize={} fsync={} flush={}",
      style("effective:").dim(),
      cfg.mode,
      cfg.object_lookup,
      cfg.optimize,
      cfg.fsync,
      cfg.flush_before_scan
   );

   println!("\n{} {} {}", style("System:").dim(), std::env::consts::OS, std::env::consts::ARCH);

   if all_good {
      println!("\n{}", style("✓ All checks passed!").green().bold());
   } else {
      println!(
         "\n{}",
         style("✗ Some ZFS tools are missing. Install OpenZFS or set ZRECSYNC_*_BIN.")
            .red()
            .bold()
      );
   }

   Ok(())
}

/// Checks whether a binary can be spawned and prints its status.
async fn check_binary(bin: &Path) -> bool {
   // zdb and zpool print usage on `-?`; the exit status is irrelevant here.
   let spawned = Command::new(bin)
      .arg("-?")
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .kill_on_drop(true)
      .status()
      .await;

   let (symbol, status) = match &spawned {
      Ok(_) => (style("✓").green(), "found".to_string()),
      Err(e) => (style("✗").red(), e.to_string()),
   };
   println!("{} {}: {}", symbol, style(bin.display()).bold(), style(status).dim());
   spawned.is_ok()
}
