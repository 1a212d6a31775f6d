//! Scan command.
//!
//! Prints the record map of a single file, for inspecting what the comparator
//! will see. Never writes anything.

use std::path::PathBuf;

use console::style;
use serde::Serialize;

use crate::{
   Result,
   engine::SyncEngine,
   record::{CompareMode, Token},
   util::format_size,
   zfs::Zfs,
};

#[derive(Serialize)]
struct JsonRecord<'a> {
   offset: u64,
   token:  &'a Token,
}

#[derive(Serialize)]
struct JsonScan<'a> {
   path:        &'a PathBuf,
   dataset:     Option<&'a str>,
   size:        u64,
   record_size: u64,
   mode:        CompareMode,
   records:     Vec<JsonRecord<'a>>,
}

/// Executes the scan command.
pub async fn execute<Z: Zfs>(zfs: Z, path: PathBuf, mode: CompareMode, json: bool) -> Result<()> {
   let engine = SyncEngine::new(zfs);
   engine.zfs().flush().await?;
   let state = engine.scan(&path, mode).await?;

   if json {
      let out = JsonScan {
         path: &state.path,
         dataset: state.volume.as_ref().map(|v| v.dataset.as_str()),
         size: state.size,
         record_size: state.record_size,
         mode,
         records: state
            .records
            .iter()
            .map(|(&offset, token)| JsonRecord { offset, token })
            .collect(),
      };
      println!("{}", serde_json::to_string_pretty(&out)?);
      return Ok(());
   }

   println!(
      "{} {} ({}, recordsize {}, {} records, {} holes)",
      style("Records of").bold(),
      state.path.display(),
      format_size(state.size),
      format_size(state.record_size),
      state.records.len(),
      state.records.holes()
   );
   for (offset, token) in &state.records {
      println!("{offset:>16x}  {token}");
   }
   Ok(())
}
