//! Cyberworks/TinkerBell `DataNN.dat` archives.
//!
//! Data files carry no index of their own; the table of contents for every
//! `DataNN.dat` in a directory lives in `Data00.dat`. Records there are
//! followed by a title-specific number of extra bytes, so the layout comes
//! from the scheme catalog.

use super::{ArchiveFormat, detect_entry_image, detect_image, is_sane_count, open_region};
use crate::codec::Compression;
use crate::container::entry::{Entry, EntryKind};
use crate::container::meta::{CyberworksMeta, FormatMeta};
use crate::error::{GarcError, Result};
use crate::formats::cyberworks_image;
use crate::image::data::DecodedImage;
use crate::image::delta::DecodeGuard;
use crate::read::opened::ArcFile;
use crate::read::view::ArcView;
use crate::scheme::{DataScheme, SchemeCatalog};
use crate::util::bytes;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

const TOC_NAME: &str = "Data00.dat";

/// Smallest entry that can hold a typed picture header.
const MIN_TYPED_IMAGE: u64 = 0x1D;

pub struct DataFormat;

impl ArchiveFormat for DataFormat {
    fn tag(&self) -> &'static str {
        "DATA/Csystem"
    }

    fn description(&self) -> &'static str {
        "TinkerBell resource archive in Resources subdirectory"
    }

    fn try_open(&self, view: &Arc<ArcView>, schemes: &SchemeCatalog) -> Result<Vec<Entry>> {
        let name = view.file_name().ok_or(GarcError::DetectionMiss)?;
        if name.eq_ignore_ascii_case(TOC_NAME) {
            return Err(GarcError::DetectionMiss);
        }
        let arc_index = archive_number(name).ok_or(GarcError::DetectionMiss)?;
        let toc_path = find_toc(view).ok_or(GarcError::DetectionMiss)?;
        let scheme = schemes.resolve_cyberworks(view);
        let toc = ArcView::open(&toc_path)?;
        let dir = scan_toc(&toc, arc_index, scheme)?;
        if dir.is_empty() {
            return Err(GarcError::DetectionMiss);
        }
        for entry in &dir {
            entry.ensure_placement(view.len())?;
        }
        tracing::debug!(archive = arc_index, entries = dir.len(), extra = scheme.extra_header_size, "cyberworks index");
        Ok(dir)
    }

    fn open_entry(&self, arc: &ArcFile, entry: &Entry) -> Result<Box<dyn Read + Send>> {
        if entry.size == 0 {
            return Err(GarcError::EmptyEntry(entry.name.clone()));
        }
        open_region(arc, entry)
    }

    fn open_image(&self, arc: &ArcFile, index: usize, guard: &mut DecodeGuard) -> Result<DecodedImage> {
        let entry = arc.entry(index)?;
        if entry.size < MIN_TYPED_IMAGE {
            return detect_entry_image(arc, index);
        }
        let data = arc.read_entry(index)?;
        match data.first().copied() {
            Some(cyberworks_image::TYPE_PLAIN | cyberworks_image::TYPE_ALPHA_DELTA) => {
                let info = cyberworks_image::read_metadata(&data)?;
                let base = match &info.extra {
                    FormatMeta::Cyberworks(CyberworksMeta { base_index: Some(base), .. }) => {
                        tracing::trace!(entry = index, base, "decoding base image");
                        Some(arc.open_image_guarded(*base, guard)?.into_pixels()?)
                    }
                    _ => None,
                };
                Ok(DecodedImage::Pixels(cyberworks_image::decode(&data, &info, base)?))
            }
            Some(0x62 | 0x63) => {
                let img_size = bytes::u32_be(&data, 1)? as usize;
                let start = data.len().checked_sub(img_size).ok_or_else(|| {
                    GarcError::malformed_data(format!("{}: wrapped image larger than entry", entry.name))
                })?;
                let view = ArcView::from_bytes(arc.view().sibling(&entry.name), data[start..].to_vec());
                detect_image(&view)
            }
            _ => {
                let view = ArcView::from_bytes(arc.view().sibling(&entry.name), data);
                detect_image(&view)
            }
        }
    }
}

/// `Data07.dat` -> 7.
fn archive_number(file_name: &str) -> Option<usize> {
    let dot = file_name.find('.')?;
    file_name.get(4..dot)?.parse().ok()
}

fn find_toc(view: &ArcView) -> Option<PathBuf> {
    let exact = view.sibling(TOC_NAME);
    if exact.is_file() {
        return Some(exact);
    }
    let dir = if view.dir().as_os_str().is_empty() { std::path::Path::new(".") } else { view.dir() };
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_str().is_some_and(|n| n.eq_ignore_ascii_case(TOC_NAME)))
        .map(|e| e.path())
}

fn count_at(toc: &ArcView, pos: u64) -> Result<u64> {
    let n = toc.i32_at(pos)?;
    u64::try_from(n).map_err(|_| GarcError::malformed_index(format!("negative count at 0x{pos:X}")))
}

fn advance(pos: u64, by: i64) -> Result<u64> {
    pos.checked_add_signed(by)
        .ok_or_else(|| GarcError::malformed_index("table of contents cursor out of range"))
}

/// Walk the table of contents up to archive `arc_index` and collect its
/// records.
fn scan_toc(toc: &ArcView, arc_index: usize, scheme: DataScheme) -> Result<Vec<Entry>> {
    let record = 0xC + scheme.extra_header_size as u64;
    let archives = count_at(toc, 0)?;
    if arc_index as u64 >= archives {
        return Err(GarcError::DetectionMiss);
    }
    let mut pos = 4;
    for i in 0..=arc_index {
        let entries = count_at(toc, pos)?;
        pos += 4;
        if i == arc_index {
            if entries > 0 && !is_sane_count(entries as i64) {
                return Err(GarcError::malformed_index(format!("{entries} entries")));
            }
            let mut dir = Vec::with_capacity(entries as usize);
            for j in 0..entries {
                let unpacked = toc.u32_at(pos)?;
                let size = toc.u32_at(pos + 4)? as u64;
                let offset = toc.u32_at(pos + 8)? as u64;
                let mut entry = Entry::new(format!("{j:04}")).with_placement(offset, size);
                entry.kind = EntryKind::Image;
                if unpacked != 0 {
                    entry.unpacked_size = Some(unpacked as u64);
                    entry.compression = Some(Compression::Lzss);
                    entry.packed = true;
                }
                dir.push(entry);
                pos += record;
            }
            return Ok(dir);
        }
        pos = advance(pos, entries as i64 * record as i64)?;

        let chunks_a = count_at(toc, pos)?;
        pos += 4;
        for _ in 0..chunks_a {
            pos += 0xC;
            let n = toc.i32_at(pos)? as i64;
            pos += 4;
            pos = advance(pos, (n - 1) * 4 + n * 0xC)?;
        }

        let chunks_b = toc.i32_at(pos)?;
        pos += 4;
        if chunks_b != 0 {
            pos += 4;
            let n = toc.i32_at(pos)? as i64;
            pos += 4;
            pos = advance(pos, n * 8)?;
        }
    }
    Ok(Vec::new())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;

    /// `(unpacked, size, offset)` records for each archive, plus the given
    /// extra bytes per record. Every archive gets one chunk-A item with two
    /// sub-records and a non-empty chunk-B block.
    pub(crate) fn build_toc(archives: &[&[(u32, u32, u32)]], extra: usize) -> Vec<u8> {
        let mut v = (archives.len() as i32).to_le_bytes().to_vec();
        for records in archives {
            v.extend((records.len() as i32).to_le_bytes());
            for (unpacked, size, offset) in records.iter() {
                v.extend(unpacked.to_le_bytes());
                v.extend(size.to_le_bytes());
                v.extend(offset.to_le_bytes());
                v.extend(vec![0xEE; extra]);
            }
            v.extend(1i32.to_le_bytes());
            v.extend([0u8; 0xC]);
            v.extend(2i32.to_le_bytes());
            v.extend([0u8; 4 + 2 * 0xC]);
            v.extend(1i32.to_le_bytes());
            v.extend([0u8; 4]);
            v.extend(3i32.to_le_bytes());
            v.extend([0u8; 3 * 8]);
        }
        v
    }

    #[rstest]
    #[case("Data01.dat", Some(1))]
    #[case("data12.DAT", Some(12))]
    #[case("Data.dat", None)]
    #[case("DataXY.dat", None)]
    fn parses_archive_numbers(#[case] name: &str, #[case] expected: Option<usize>) {
        assert_eq!(archive_number(name), expected);
    }

    #[test]
    fn skips_earlier_archives_in_the_toc() {
        let toc = build_toc(&[&[(0, 4, 0), (0, 4, 4)], &[(9, 3, 0), (0, 5, 3)]], 4);
        let toc = ArcView::from_bytes("Data00.dat", toc);
        let dir = scan_toc(&toc, 1, DataScheme { extra_header_size: 4 }).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!((dir[0].name.as_str(), dir[0].offset, dir[0].size), ("0000", 0, 3));
        assert_eq!(dir[0].compression, Some(Compression::Lzss));
        assert_eq!(dir[0].unpacked_size, Some(9));
        assert_eq!((dir[1].name.as_str(), dir[1].offset, dir[1].size), ("0001", 3, 5));
        assert!(!dir[1].packed);
        assert!(dir.iter().all(|e| e.kind == EntryKind::Image));
    }

    #[test]
    fn archive_number_beyond_toc_is_a_miss() {
        let toc = ArcView::from_bytes("Data00.dat", build_toc(&[&[(0, 1, 0)]], 0));
        assert!(matches!(
            scan_toc(&toc, 1, DataScheme::default()),
            Err(GarcError::DetectionMiss)
        ));
    }

    #[test]
    fn needs_sibling_toc() {
        let dir = tempfile::tempdir().unwrap();
        let view = Arc::new(ArcView::from_bytes(dir.path().join("Data01.dat"), vec![0; 16]));
        assert!(DataFormat.try_open(&view, &SchemeCatalog::default()).is_err());

        std::fs::write(dir.path().join("DATA00.DAT"), build_toc(&[&[], &[(0, 16, 0)]], 0)).unwrap();
        let dir = DataFormat.try_open(&view, &SchemeCatalog::default()).unwrap();
        assert_eq!(dir.len(), 1);
    }
}
