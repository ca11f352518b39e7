//! NScripter `.dat` script archives.
//!
//! Big-endian index: `i16` count, then 17-byte records of hash, compression
//! byte, absolute offset, stored size and unpacked size. Some files carry a
//! two-byte zero prefix before the count. Entries have no stored names.

use super::{ArchiveFormat, is_sane_count};
use crate::codec::Compression;
use crate::container::entry::Entry;
use crate::error::{GarcError, Result};
use crate::read::view::ArcView;
use crate::scheme::SchemeCatalog;
use crate::util::bytes;
use std::sync::Arc;

const RECORD_SIZE: usize = 17;

pub struct DatFormat;

impl ArchiveFormat for DatFormat {
    fn tag(&self) -> &'static str {
        "NSA/DAT"
    }

    fn description(&self) -> &'static str {
        "NScripter script archive"
    }

    fn try_open(&self, view: &Arc<ArcView>, _schemes: &SchemeCatalog) -> Result<Vec<Entry>> {
        let start = if view.i16_at(0)? == 0 { 2 } else { 0 };
        let count = bytes::i16_be(&view.bytes_at(start, 2)?, 0)? as i64;
        if !is_sane_count(count) {
            return Err(GarcError::DetectionMiss);
        }
        let index_len = count as usize * RECORD_SIZE;
        if start + 2 + index_len as u64 > view.len() {
            return Err(GarcError::DetectionMiss);
        }
        let index = view.bytes_at(start + 2, index_len)?;

        let mut dir = Vec::with_capacity(count as usize);
        for (i, rec) in index.chunks_exact(RECORD_SIZE).enumerate() {
            let hash = bytes::u32_be(rec, 0)?;
            let code = rec[4];
            let offset = bytes::u32_be(rec, 5)? as u64;
            let size = bytes::u32_be(rec, 9)? as u64;
            let mut entry = Entry::new(format!("{i:04}_{hash:08X}.txt")).with_placement(offset, size);
            entry.ensure_placement(view.len())?;
            entry.hash = Some(hash);
            entry.unpacked_size = Some(bytes::u32_be(rec, 13)? as u64);
            entry.compression = Some(Compression::from_nsa(code));
            entry.packed = code != 0;
            tracing::trace!(name = %entry.name, offset, size, compression = code, "nsa entry");
            dir.push(entry);
        }
        Ok(dir)
    }
}
