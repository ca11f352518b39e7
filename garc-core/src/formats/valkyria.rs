//! Valkyria `.dat` archives: a `u32` index size, then 0x10C-byte records.
//!
//! A zero first word marks the keyed revision: the index size moves to
//! offset 4 and each record's offset and size are XORed with a key derived
//! from its name and from `system.dat` in the same directory.

use super::{ArchiveFormat, is_sane_count};
use crate::container::entry::Entry;
use crate::crypto::valkyria::{SYSTEM_INFO_LEN, SYSTEM_INFO_OFFSET, arc_key, entry_key};
use crate::error::{GarcError, Result};
use crate::read::view::ArcView;
use crate::scheme::SchemeCatalog;
use crate::util::bytes;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

const RECORD_SIZE: u64 = 0x10C;
const NAME_SIZE: usize = 0x104;

pub struct DatFormat;

impl ArchiveFormat for DatFormat {
    fn tag(&self) -> &'static str {
        "DAT/VALKYRIA"
    }

    fn description(&self) -> &'static str {
        "Valkyria resource archive"
    }

    fn try_open(&self, view: &Arc<ArcView>, _schemes: &SchemeCatalog) -> Result<Vec<Entry>> {
        let index_size = view.u32_at(0)?;
        if index_size == 0 {
            return open_keyed(view);
        }
        let count = record_count(view, index_size)?;
        read_index(view, 4, count, None)
    }
}

fn record_count(view: &ArcView, index_size: u32) -> Result<u64> {
    if index_size == 0 || index_size as u64 >= view.len() {
        return Err(GarcError::DetectionMiss);
    }
    let count = index_size as u64 / RECORD_SIZE;
    if count * RECORD_SIZE != index_size as u64 || !is_sane_count(count as i64) {
        return Err(GarcError::DetectionMiss);
    }
    Ok(count)
}

fn open_keyed(view: &Arc<ArcView>) -> Result<Vec<Entry>> {
    let index_size = view.u32_at(4)?;
    let count = record_count(view, index_size)?;
    let key = read_arc_key(view)?;
    read_index(view, 8, count, Some(key))
}

fn read_arc_key(view: &ArcView) -> Result<[u8; 4]> {
    let path = view.sibling("system.dat");
    let mut f = std::fs::File::open(&path).map_err(|_| GarcError::DetectionMiss)?;
    f.seek(SeekFrom::Start(SYSTEM_INFO_OFFSET))?;
    let mut info = Vec::with_capacity(SYSTEM_INFO_LEN);
    f.take(SYSTEM_INFO_LEN as u64).read_to_end(&mut info)?;
    info.resize(SYSTEM_INFO_LEN, 0);
    arc_key(&info).ok_or_else(|| GarcError::malformed_index("system.dat key block is not terminated"))
}

fn read_index(view: &ArcView, start: u64, count: u64, key: Option<[u8; 4]>) -> Result<Vec<Entry>> {
    let index = view.bytes_at(start, (count * RECORD_SIZE) as usize)?;
    let base = start + index.len() as u64;
    let mut dir = Vec::with_capacity(count as usize);
    for rec in index.chunks_exact(RECORD_SIZE as usize) {
        let name_field = &rec[..NAME_SIZE];
        let mask = match &key {
            Some(k) => entry_key(k, name_field)
                .ok_or_else(|| GarcError::malformed_index("unterminated entry name"))?,
            None => 0,
        };
        let offset = base + (bytes::u32_le(rec, NAME_SIZE)? ^ mask) as u64;
        let size = (bytes::u32_le(rec, NAME_SIZE + 4)? ^ mask) as u64;
        let entry = Entry::new(bytes::cp932_name(name_field)).with_placement(offset, size);
        entry.ensure_placement(view.len())?;
        tracing::trace!(name = %entry.name, offset, size, keyed = key.is_some(), "dat entry");
        dir.push(entry);
    }
    Ok(dir)
}
