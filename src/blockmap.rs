//! Parser for `zdb` block-map dumps.
//!
//! Only leaf (`L0`) lines describe data records:
//!
//! ```text
//!            20000   L0 0:4a3c000:20000 20000L/8a00P F=1 B=1832/1832 cksum=1b6e7a1f2c:...
//! ```
//!
//! The first column is the record offset in hex, the second the level. The
//! remainder carries one or more physical-location triples (`vdev:offset:asize`,
//! optionally wrapped as `DVA[n]=<...>`) and a `cksum=` annotation. Embedded
//! blocks carry neither and come out as [`Token::Unknown`] in both modes.

use std::io::BufRead;

use crate::{
   error::Result,
   record::{CompareMode, RecordMap, Token},
};

const LEAF_LEVEL: &str = "L0";
const CKSUM_PREFIX: &str = "cksum=";

/// One parsed leaf record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
   pub offset: u64,
   pub token:  Token,
}

/// Parses one line of block-map output.
///
/// Returns `None` for anything that is not a well-formed leaf record line.
pub fn parse_line(line: &str, mode: CompareMode) -> Option<Entry> {
   if !line.starts_with(char::is_whitespace) {
      return None;
   }

   let mut fields = line.split_whitespace();
   let offset = u64::from_str_radix(fields.next()?, 16).ok()?;
   if fields.next()? != LEAF_LEVEL {
      return None;
   }

   let mut location = None;
   let mut cksum = None;
   for field in fields {
      if let Some(value) = field.strip_prefix(CKSUM_PREFIX) {
         if cksum.is_none() && !value.is_empty() {
            cksum = Some(value);
         }
      } else if location.is_none()
         && let Some(triple) = location_triple(field)
      {
         location = Some(triple);
      }
   }

   let token = match mode {
      CompareMode::Address => {
         location.map_or(Token::Unknown, |triple| Token::Address(triple.to_string()))
      },
      CompareMode::Hash => match (cksum, location) {
         (Some(value), _) => Token::Hash(value.to_string()),
         (None, Some(triple)) if is_null_triple(triple) => Token::Hole,
         (None, _) => Token::Unknown,
      },
   };

   Some(Entry { offset, token })
}

/// Extracts a `vdev:offset:asize` triple from a field, unwrapping `DVA[n]=<...>`.
fn location_triple(field: &str) -> Option<&str> {
   let candidate = match field.split_once("=<") {
      Some((prefix, rest)) if prefix.starts_with("DVA") => rest.strip_suffix('>')?,
      Some(_) => return None,
      None => field,
   };

   let mut parts = candidate.split(':');
   let valid = (0..3).all(|_| {
      parts
         .next()
         .is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_hexdigit()))
   });
   (valid && parts.next().is_none()).then_some(candidate)
}

fn is_null_triple(triple: &str) -> bool {
   triple.split(':').all(|p| p.bytes().all(|b| b == b'0'))
}

/// Builds a record map from a block-map dump.
///
/// Lines that do not parse are skipped, as are records at or beyond `extent`
/// (the file's size). Only read errors are reported.
pub fn read_record_map<R: BufRead>(mut reader: R, mode: CompareMode, extent: u64) -> Result<RecordMap> {
   let mut map = RecordMap::new();
   let mut buf = Vec::new();
   let mut skipped = 0usize;

   loop {
      buf.clear();
      if reader.read_until(b'\n', &mut buf)? == 0 {
         break;
      }
      let line = String::from_utf8_lossy(&buf);
      match parse_line(line.trim_end_matches(['\n', '\r']), mode) {
         Some(entry) if entry.offset < extent => map.insert(entry.offset, entry.token),
         Some(_) => skipped += 1,
         None => {},
      }
   }

   if skipped > 0 {
      tracing::debug!("dropped {skipped} records beyond the file extent of {extent} bytes");
   }
   Ok(map)
}
