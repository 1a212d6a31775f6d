//! Record reconciliation between a source and a destination.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
   error::{Error, Result},
   record::{FileState, RecordMap},
};

/// Ascending offsets of the records that must be written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiffSet {
   offsets: Vec<u64>,
}

impl DiffSet {
   pub fn len(&self) -> usize {
      self.offsets.len()
   }

   pub fn is_empty(&self) -> bool {
      self.offsets.is_empty()
   }

   pub fn iter(&self) -> impl ExactSizeIterator<Item = u64> + '_ {
      self.offsets.iter().copied()
   }

   pub fn offsets(&self) -> &[u64] {
      &self.offsets
   }

   pub fn contains(&self, offset: u64) -> bool {
      self.offsets.binary_search(&offset).is_ok()
   }

   /// Bytes the write phase reads from the source, clamped at its end.
   pub fn planned_bytes(&self, record_size: u64, source_size: u64) -> u64 {
      self
         .offsets
         .iter()
         .map(|&offset| record_size.min(source_size.saturating_sub(offset)))
         .sum()
   }
}

impl FromIterator<u64> for DiffSet {
   fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
      let offsets: BTreeSet<u64> = iter.into_iter().collect();
      Self { offsets: offsets.into_iter().collect() }
   }
}

/// Computes the offsets whose destination content differs from the source.
///
/// Every source record is checked against the destination. Destination
/// records missing from the source only count when they lie below
/// `source_size`; anything past it is cut off by the final resize.
pub fn compare(src: &RecordMap, dst: &RecordMap, source_size: u64) -> DiffSet {
   let forward = src.iter().filter_map(|(&offset, token)| {
      let equal = match dst.get(offset) {
         Some(other) => token.matches(other),
         None => token.is_hole(),
      };
      (!equal).then_some(offset)
   });

   let reverse = dst
      .iter()
      .filter(|&(&offset, _)| !src.contains(offset))
      .take_while(|&(&offset, _)| offset < source_size)
      .filter_map(|(&offset, token)| (!token.is_hole()).then_some(offset));

   forward.chain(reverse).collect()
}

/// Fails when the two files cannot be compared record for record.
pub fn check_record_sizes(src: &FileState, dst: &FileState) -> Result<()> {
   if src.record_size != dst.record_size {
      return Err(Error::RecordSizeMismatch {
         source_size:      src.record_size,
         destination_size: dst.record_size,
      });
   }
   Ok(())
}
