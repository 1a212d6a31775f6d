//! Formatting helpers for human-readable output

use std::time::Duration;

/// Formats a byte count as a human-readable size string
pub fn format_size(bytes: u64) -> String {
   const KB: u64 = 1024;
   const MB: u64 = KB * 1024;
   const GB: u64 = MB * 1024;
   const TB: u64 = GB * 1024;

   if bytes < KB {
      format!("{bytes} B")
   } else if bytes < MB {
      format!("{:.1} KB", bytes as f64 / KB as f64)
   } else if bytes < GB {
      format!("{:.1} MB", bytes as f64 / MB as f64)
   } else if bytes < TB {
      format!("{:.1} GB", bytes as f64 / GB as f64)
   } else {
      format!("{:.1} TB", bytes as f64 / TB as f64)
   }
}

/// Formats a throughput figure, or `-` when there is none.
pub fn format_rate(bytes_per_sec: Option<f64>) -> String {
   match bytes_per_sec {
      Some(rate) if rate.is_finite() => format!("{}/s", format_size(rate.round() as u64)),
      _ => "-".to_string(),
   }
}

pub fn format_duration(d: Duration) -> String {
   let secs = d.as_secs_f64();
   if secs < 1.0 {
      format!("{:.0} ms", secs * 1000.0)
   } else if secs < 120.0 {
      format!("{secs:.2} s")
   } else {
      format!("{}m{:02}s", d.as_secs() / 60, d.as_secs() % 60)
   }
}
