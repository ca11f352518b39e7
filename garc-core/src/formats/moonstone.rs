//! MOONSTONE `DATA$TOP` resource archives.
//!
//! Layout: `DATA$TOP` magic, record count plus one at 0x38, then 0x40-byte
//! records from 0x40 (name 0x30 bytes, offset at +0x34, size at +0x38).
//! Data begins right after the record table.

use super::{ArchiveFormat, is_sane_count};
use crate::container::entry::Entry;
use crate::error::{GarcError, Result};
use crate::read::view::ArcView;
use crate::scheme::SchemeCatalog;
use std::sync::Arc;

const RECORD_SIZE: u64 = 0x40;

pub struct PakFormat;

impl ArchiveFormat for PakFormat {
    fn tag(&self) -> &'static str {
        "PAK/DATATOP"
    }

    fn description(&self) -> &'static str {
        "MOONSTONE resource archive"
    }

    fn signature(&self) -> u32 {
        u32::from_le_bytes(*b"DATA")
    }

    fn try_open(&self, view: &Arc<ArcView>, _schemes: &SchemeCatalog) -> Result<Vec<Entry>> {
        if !view.ascii_eq(0, b"DATA") || !view.ascii_eq(4, b"$TOP") {
            return Err(GarcError::DetectionMiss);
        }
        let count = view.i32_at(0x38)? as i64 - 1;
        if !is_sane_count(count) {
            return Err(GarcError::DetectionMiss);
        }
        let base = RECORD_SIZE * (count as u64 + 1);
        let mut dir = Vec::with_capacity(count as usize);
        let mut pos = RECORD_SIZE;
        for _ in 0..count {
            let name = view.name_at(pos, 0x30)?;
            let offset = base + view.u32_at(pos + 0x34)? as u64;
            let size = view.u32_at(pos + 0x38)? as u64;
            let entry = Entry::new(name).with_placement(offset, size);
            entry.ensure_placement(view.len())?;
            tracing::trace!(name = %entry.name, offset, size, "pak entry");
            dir.push(entry);
            pos += RECORD_SIZE;
        }
        Ok(dir)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a PAK holding `files` in order.
    pub(crate) fn build(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut v = vec![0u8; 0x40 * (files.len() + 1)];
        v[..8].copy_from_slice(b"DATA$TOP");
        v[0x38..0x3C].copy_from_slice(&(files.len() as i32 + 1).to_le_bytes());
        let mut data = Vec::new();
        for (i, (name, body)) in files.iter().enumerate() {
            let rec = 0x40 * (i + 1);
            v[rec..rec + name.len()].copy_from_slice(name.as_bytes());
            v[rec + 0x34..rec + 0x38].copy_from_slice(&(data.len() as u32).to_le_bytes());
            v[rec + 0x38..rec + 0x3C].copy_from_slice(&(body.len() as u32).to_le_bytes());
            data.extend_from_slice(body);
        }
        v.extend(data);
        v
    }

    #[test]
    fn parses_records_after_table() {
        let raw = build(&[("bg/sky.bmp", b"BM..."), ("se.ogg", b"OggS")]);
        let view = Arc::new(ArcView::from_bytes("a.pak", raw));
        let dir = PakFormat.try_open(&view, &SchemeCatalog::default()).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir[0].name, "bg/sky.bmp");
        assert_eq!((dir[0].offset, dir[0].size), (0xC0, 5));
        assert_eq!((dir[1].offset, dir[1].size), (0xC5, 4));
    }

    #[test]
    fn entry_past_end_is_a_miss() {
        let mut raw = build(&[("a", b"xyz")]);
        raw.truncate(raw.len() - 1);
        let view = Arc::new(ArcView::from_bytes("a.pak", raw));
        assert!(PakFormat.try_open(&view, &SchemeCatalog::default()).is_err());
    }
}
