//! Configuration for tool locations and run defaults.

use std::{
   path::{Path, PathBuf},
   sync::OnceLock,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{record::CompareMode, zfs::ObjectLookup};

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub zfs_bin:   PathBuf,
   pub zpool_bin: PathBuf,
   pub zdb_bin:   PathBuf,

   pub object_lookup: ObjectLookup,
   pub mode:          CompareMode,

   pub optimize:          bool,
   pub fsync:             bool,
   pub flush_before_scan: bool,
   pub progress:          bool,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         zfs_bin: PathBuf::from("zfs"),
         zpool_bin: PathBuf::from("zpool"),
         zdb_bin: PathBuf::from("zdb"),
         object_lookup: ObjectLookup::Inode,
         mode: CompareMode::Address,
         optimize: false,
         fsync: true,
         flush_before_scan: true,
         progress: true,
      }
   }
}

impl Config {
   pub fn load() -> Self {
      Self::load_from(config_file_path())
   }

   /// Loads defaults, then `path` if it exists, then `ZRECSYNC_*` variables.
   pub fn load_from(path: &Path) -> Self {
      let mut figment = Figment::from(Serialized::defaults(Self::default()));
      if path.exists() {
         figment = figment.merge(Toml::file(path));
      }

      figment
         .merge(Env::prefixed("ZRECSYNC_").lowercase(true))
         .extract()
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Returns the base directory for zrecsync configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".zrecsync"))
}

pub fn config_file_path() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| base_dir().join("config.toml"))
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}
