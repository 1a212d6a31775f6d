use std::{io, path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// Main error type for zrecsync.
///
/// Precondition failures are raised before anything is written. External-tool
/// failures can happen during metadata lookup or the scan phase and abort the
/// whole run. I/O errors during the write phase leave the destination partially
/// updated; nothing is rolled back.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during file operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// JSON serialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// The source file does not exist.
   #[error("source file not found: {}", .0.display())]
   SourceMissing(PathBuf),

   /// The destination file does not exist and cannot be created (dry-run).
   #[error("destination file not found: {}", .0.display())]
   DestinationMissing(PathBuf),

   /// Source and destination use different record sizes.
   #[error("record size mismatch: source {source_size} bytes, destination {destination_size} bytes")]
   RecordSizeMismatch { source_size: u64, destination_size: u64 },

   /// The file does not live below the mountpoint reported for its dataset.
   #[error("{} is not inside mountpoint {}", .path.display(), .mountpoint.display())]
   NotOnVolume { path: PathBuf, mountpoint: PathBuf },

   /// Failed to spawn an external tool.
   #[error("failed to run {tool}: {source}")]
   Spawn {
      tool:   String,
      #[source]
      source: io::Error,
   },

   /// An external tool wrote to stderr or exited unsuccessfully.
   #[error("{tool} failed ({status}): {stderr}")]
   ExternalTool { tool: String, status: ExitStatus, stderr: String },

   /// An external tool produced output that could not be interpreted.
   #[error("unexpected output from {tool}: {output}")]
   ToolOutput { tool: String, output: String },

   /// Unknown comparison mode name.
   #[error("invalid compare mode '{0}' (expected 'address' or 'hash')")]
   InvalidMode(String),

   /// A file was scanned before its dataset was resolved.
   #[error("no dataset resolved for {}", .0.display())]
   Unresolved(PathBuf),
}

impl Error {
   /// Whether the error was raised before any write could have happened.
   pub const fn is_precondition(&self) -> bool {
      matches!(
         self,
         Self::SourceMissing(_)
            | Self::DestinationMissing(_)
            | Self::RecordSizeMismatch { .. }
            | Self::NotOnVolume { .. }
            | Self::InvalidMode(_)
      )
   }

   pub const fn exit_code(&self) -> i32 {
      if self.is_precondition() {
         return 2;
      }
      match self {
         Self::Spawn { .. } | Self::ExternalTool { .. } | Self::ToolOutput { .. } => 3,
         _ => 1,
      }
   }
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn precondition_errors_exit_with_two() {
      let err = Error::RecordSizeMismatch { source_size: 131072, destination_size: 4096 };
      assert!(err.is_precondition());
      assert_eq!(err.exit_code(), 2);
      assert_eq!(Error::SourceMissing(PathBuf::from("/nope")).exit_code(), 2);
   }

   #[test]
   fn tool_errors_exit_with_three() {
      let err = Error::ToolOutput { tool: "zfs".into(), output: String::new() };
      assert_eq!(err.exit_code(), 3);
      assert_eq!(Error::Io(io::Error::other("boom")).exit_code(), 1);
   }
}
