//! Per-record identity and the per-file record map.

use std::{
   collections::{BTreeMap, btree_map},
   fmt,
   path::PathBuf,
   str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
   error::{Error, Result},
   zfs::Volume,
};

/// How records of the two files are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
   /// Compare physical block locations (DVAs). Exact, but only meaningful when
   /// both files share block ancestry.
   #[default]
   Address,
   /// Compare block checksums. Works for unrelated files.
   Hash,
}

impl CompareMode {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Address => "address",
         Self::Hash => "hash",
      }
   }
}

impl fmt::Display for CompareMode {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

impl FromStr for CompareMode {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      match s.trim().to_ascii_lowercase().as_str() {
         "address" | "dva" => Ok(Self::Address),
         "hash" | "checksum" | "cksum" => Ok(Self::Hash),
         other => Err(Error::InvalidMode(other.to_string())),
      }
   }
}

/// Comparison token carried by a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Token {
   /// Physical location of the block, verbatim from the block map.
   Address(String),
   /// Block checksum, verbatim from the block map.
   Hash(String),
   /// Unallocated record; reads as zeros.
   Hole,
   /// The record exists but its content cannot be identified.
   Unknown,
}

impl Token {
   /// Whether two tokens identify the same content.
   ///
   /// `Unknown` never matches, not even another `Unknown`.
   pub fn matches(&self, other: &Self) -> bool {
      match (self, other) {
         (Self::Unknown, _) | (_, Self::Unknown) => false,
         (a, b) => a == b,
      }
   }

   pub const fn is_hole(&self) -> bool {
      matches!(self, Self::Hole)
   }
}

impl fmt::Display for Token {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Address(dva) => write!(f, "dva={dva}"),
         Self::Hash(cksum) => write!(f, "cksum={cksum}"),
         Self::Hole => f.write_str("hole"),
         Self::Unknown => f.write_str("unknown"),
      }
   }
}

/// Ordered `offset -> token` map for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMap {
   records: BTreeMap<u64, Token>,
}

impl RecordMap {
   pub const fn new() -> Self {
      Self { records: BTreeMap::new() }
   }

   pub fn from_entries(entries: impl IntoIterator<Item = (u64, Token)>) -> Self {
      let mut map = Self::new();
      for (offset, token) in entries {
         map.insert(offset, token);
      }
      map
   }

   /// Inserts a record; a later entry for the same offset replaces the earlier.
   pub fn insert(&mut self, offset: u64, token: Token) {
      self.records.insert(offset, token);
   }

   pub fn get(&self, offset: u64) -> Option<&Token> {
      self.records.get(&offset)
   }

   pub fn contains(&self, offset: u64) -> bool {
      self.records.contains_key(&offset)
   }

   pub fn len(&self) -> usize {
      self.records.len()
   }

   pub fn is_empty(&self) -> bool {
      self.records.is_empty()
   }

   /// Records in ascending offset order.
   pub fn iter(&self) -> btree_map::Iter<'_, u64, Token> {
      self.records.iter()
   }

   pub fn offsets(&self) -> impl Iterator<Item = u64> + '_ {
      self.records.keys().copied()
   }

   /// Number of records that are explicit holes.
   pub fn holes(&self) -> usize {
      self.records.values().filter(|t| t.is_hole()).count()
   }
}

impl<'a> IntoIterator for &'a RecordMap {
   type IntoIter = btree_map::Iter<'a, u64, Token>;
   type Item = (&'a u64, &'a Token);

   fn into_iter(self) -> Self::IntoIter {
      self.iter()
   }
}

/// Everything the pipeline knows about one side of a run.
#[derive(Debug, Clone)]
pub struct FileState {
   pub path:        PathBuf,
   pub size:        u64,
   pub record_size: u64,
   pub inode:       u64,
   pub volume:      Option<Volume>,
   /// Path relative to the dataset mountpoint.
   pub relative:    Option<PathBuf>,
   pub records:     RecordMap,
}

impl FileState {
   /// State for a file that has not been scanned yet.
   pub fn new(path: PathBuf, size: u64, record_size: u64, inode: u64) -> Self {
      Self { path, size, record_size, inode, volume: None, relative: None, records: RecordMap::new() }
   }
}
