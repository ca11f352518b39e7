//! LiLiM engine archives.
//!
//! Two index shapes share the extension: a flat table at 0x111 (v2) and a
//! chain of 0x20-byte records whose blocks are linked by all-0xFF records
//! (v1). Script entries are Huffman packed behind a `u32` unpacked length.

use super::{ArchiveFormat, is_sane_count};
use crate::codec::Compression;
use crate::container::entry::{Entry, EntryKind};
use crate::error::{GarcError, Result};
use crate::read::view::ArcView;
use crate::scheme::SchemeCatalog;
use crate::util::bytes;
use std::sync::Arc;

const LINK: [u8; 16] = [0xFF; 16];
const END: [u8; 16] = [0; 16];

const V2_INDEX_OFFSET: u64 = 0x111;
const V2_RECORD_SIZE: u64 = 0x28;
const V1_RECORD_SIZE: u64 = 0x20;

fn huffman(mut entry: Entry) -> Entry {
    entry.compression = Some(Compression::Huffman);
    entry.packed = true;
    entry
}

/// Flat index: `u32 0`, `u32 base`, `i32 index_size`, records from 0x111.
pub struct AosV2Format;

impl ArchiveFormat for AosV2Format {
    fn tag(&self) -> &'static str {
        "AOS/LiLiM"
    }

    fn description(&self) -> &'static str {
        "LiLiM resource archive version 2"
    }

    fn try_open(&self, view: &Arc<ArcView>, _schemes: &SchemeCatalog) -> Result<Vec<Entry>> {
        if view.i32_at(0)? != 0 {
            return Err(GarcError::DetectionMiss);
        }
        let base = view.u32_at(4)? as u64;
        let index_size = view.i32_at(8)?;
        if index_size < 0 {
            return Err(GarcError::DetectionMiss);
        }
        let index_end = V2_INDEX_OFFSET + index_size as u64;
        if base >= view.len() || index_end >= view.len() || base < index_end {
            return Err(GarcError::DetectionMiss);
        }
        let count = index_size as u64 / V2_RECORD_SIZE;
        if !is_sane_count(count as i64) {
            return Err(GarcError::DetectionMiss);
        }

        let mut dir = Vec::with_capacity(count as usize);
        let mut pos = V2_INDEX_OFFSET;
        for _ in 0..count {
            let name = view.name_at(pos, 0x20)?;
            if name.is_empty() {
                return Err(GarcError::malformed_index("blank entry name"));
            }
            let offset = base + view.u32_at(pos + 0x20)? as u64;
            let size = view.u32_at(pos + 0x24)? as u64;
            let mut entry = Entry::new(name).with_placement(offset, size);
            entry.ensure_placement(view.len())?;
            if entry.has_extension("scr") {
                entry = huffman(entry);
            } else if entry.has_extension("cmp") {
                if let Some((stem, _)) = entry.name.rsplit_once('.') {
                    entry.name = format!("{stem}.abm");
                }
                entry.kind = EntryKind::Image;
                entry = huffman(entry);
            }
            tracing::trace!(name = %entry.name, offset, size, "aos entry");
            dir.push(entry);
            pos += V2_RECORD_SIZE;
        }
        Ok(dir)
    }
}

/// Linked-chunk index of 0x20-byte records starting at offset 0.
pub struct AosV1Format;

impl ArchiveFormat for AosV1Format {
    fn tag(&self) -> &'static str {
        "AOS"
    }

    fn description(&self) -> &'static str {
        "LiLiM/Le.Chocolat engine resource archive"
    }

    fn try_open(&self, view: &Arc<ArcView>, _schemes: &SchemeCatalog) -> Result<Vec<Entry>> {
        if view.u8_at(0)? == 0 {
            return Err(GarcError::DetectionMiss);
        }
        let first = view.u32_at(0x10)? as u64;
        if first >= view.len() || first & 0x1F != 0 {
            return Err(GarcError::DetectionMiss);
        }
        let probe = view.bytes_at(first, 0x10)?;
        if probe != LINK && probe != END {
            return Err(GarcError::DetectionMiss);
        }

        let mut dir: Vec<Entry> = Vec::new();
        let mut name_buf = [0u8; 0x10];
        let mut cur = 0u64;
        while cur < view.len() {
            if view.read_at(cur, &mut name_buf)? != name_buf.len() {
                break;
            }
            if name_buf == LINK {
                cur += V1_RECORD_SIZE + view.u32_at(cur + 0x10)? as u64;
                continue;
            }
            let raw = bytes::c_str(&name_buf);
            if raw.is_empty() {
                break;
            }
            let name = bytes::cp932_name(raw);
            if name.trim().is_empty() || dir.last().is_some_and(|e| e.name == name) {
                return Err(GarcError::malformed_index(format!("bad chunk record name {name:?}")));
            }
            let rel = view.u32_at(cur + 0x10)? as u64;
            let size = view.u32_at(cur + 0x14)? as u64;
            cur += V1_RECORD_SIZE;
            let mut entry = Entry::new(name).with_placement(cur + rel, size);
            entry.ensure_placement(view.len())?;
            if entry.has_extension("scr") {
                entry = huffman(entry);
            }
            tracing::trace!(name = %entry.name, offset = entry.offset, size, "aos entry");
            dir.push(entry);
        }
        Ok(dir)
    }
}
