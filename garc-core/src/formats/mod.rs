//! Decoder registry.
//!
//! Order matters: formats with a real signature are probed before the
//! heuristic, zero-signature ones.

use crate::codec;
use crate::container::entry::Entry;
use crate::container::meta::ImageMetaData;
use crate::error::{GarcError, Result};
use crate::image::data::{DecodedImage, EmbeddedImage};
use crate::image::delta::DecodeGuard;
use crate::image::embedded;
use crate::read::opened::ArcFile;
use crate::read::view::ArcView;
use crate::scheme::SchemeCatalog;
use std::io::Read;
use std::sync::Arc;

pub mod aos;
pub mod bip;
pub mod bsg;
pub mod cyberworks;
pub mod cyberworks_image;
pub mod mg2;
pub mod moonstone;
pub mod nscripter;
pub mod valkyria;

/// Upper bound for any entry count read from an index.
pub const MAX_ENTRY_COUNT: i64 = 0x40000;

pub fn is_sane_count(count: i64) -> bool {
    count > 0 && count < MAX_ENTRY_COUNT
}

/// A container decoder.
pub trait ArchiveFormat: Send + Sync {
    fn tag(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Leading magic as a little-endian `u32`; 0 when the format has none.
    fn signature(&self) -> u32 {
        0
    }

    /// Parse the index. Any error means "not this format".
    fn try_open(&self, view: &Arc<ArcView>, schemes: &SchemeCatalog) -> Result<Vec<Entry>>;

    /// Raw region, then whatever compression the index recorded.
    fn open_entry(&self, arc: &ArcFile, entry: &Entry) -> Result<Box<dyn Read + Send>> {
        open_region(arc, entry)
    }

    /// Decode entry `index` as an image, tracking base references in `guard`.
    fn open_image(&self, arc: &ArcFile, index: usize, _guard: &mut DecodeGuard) -> Result<DecodedImage> {
        detect_entry_image(arc, index)
    }
}

pub fn open_region(arc: &ArcFile, entry: &Entry) -> Result<Box<dyn Read + Send>> {
    let region = arc.view().region(entry.offset, entry.size)?;
    match entry.compression {
        Some(kind) => codec::open_reader(kind, Box::new(region), entry.unpacked_size),
        None => Ok(Box::new(region)),
    }
}

/// Read entry `index` fully and run generic image detection over it.
pub fn detect_entry_image(arc: &ArcFile, index: usize) -> Result<DecodedImage> {
    let entry = arc.entry(index)?;
    let data = arc.read_entry(index)?;
    let view = ArcView::from_bytes(arc.view().sibling(&entry.name), data);
    detect_image(&view)
}

/// A standalone image decoder.
pub trait ImageFormat: Send + Sync {
    fn tag(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn read_metadata(&self, view: &ArcView) -> Result<ImageMetaData>;
    fn read(&self, view: &ArcView, info: &ImageMetaData) -> Result<DecodedImage>;
}

pub static ARCHIVE_FORMATS: &[&dyn ArchiveFormat] = &[
    &moonstone::PakFormat,
    &valkyria::DatFormat,
    &aos::AosV2Format,
    &aos::AosV1Format,
    &nscripter::DatFormat,
    &cyberworks::DataFormat,
];

pub static IMAGE_FORMATS: &[&dyn ImageFormat] = &[&bsg::BsgFormat, &mg2::Mg2Format, &bip::BipFormat];

/// Try every registered image format, then fall back to sniffing a
/// standard payload (PNG, JPEG, BMP).
pub fn detect_image(view: &ArcView) -> Result<DecodedImage> {
    for format in IMAGE_FORMATS {
        match format.read_metadata(view) {
            Ok(info) => {
                tracing::trace!(format = format.tag(), "image metadata accepted");
                return format.read(view, &info);
            }
            Err(e) => tracing::trace!(format = format.tag(), error = %e, "image probe missed"),
        }
    }
    let head = view.bytes_at(0, view.len().min(0x1000) as usize)?;
    let kind = embedded::EmbeddedKind::sniff(&head).ok_or(GarcError::DetectionMiss)?;
    let info = kind.read_metadata(&head)?;
    let data = view.bytes_at(0, view.len() as usize)?;
    Ok(DecodedImage::Embedded(EmbeddedImage {
        kind,
        info,
        data,
        alpha: None,
        flip_vertical: false,
    }))
}

pub fn find_archive_format(tag: &str) -> Option<&'static dyn ArchiveFormat> {
    ARCHIVE_FORMATS
        .iter()
        .copied()
        .find(|f| f.tag().eq_ignore_ascii_case(tag))
}

pub fn find_image_format(tag: &str) -> Option<&'static dyn ImageFormat> {
    IMAGE_FORMATS
        .iter()
        .copied()
        .find(|f| f.tag().eq_ignore_ascii_case(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, false)]
    #[case(-1, false)]
    #[case(1, true)]
    #[case(0x3FFFF, true)]
    #[case(0x40000, false)]
    fn sane_counts(#[case] count: i64, #[case] ok: bool) {
        assert_eq!(is_sane_count(count), ok);
    }

    #[test]
    fn registration_order_is_fixed() {
        let tags: Vec<_> = ARCHIVE_FORMATS.iter().map(|f| f.tag()).collect();
        assert_eq!(
            tags,
            ["PAK/DATATOP", "DAT/VALKYRIA", "AOS/LiLiM", "AOS", "NSA/DAT", "DATA/Csystem"]
        );
        assert!(ARCHIVE_FORMATS[0].signature() != 0);
        let images: Vec<_> = IMAGE_FORMATS.iter().map(|f| f.tag()).collect();
        assert_eq!(images, ["BSG", "MG2", "BIP/PS2"]);
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find_archive_format("dat/valkyria").map(|f| f.tag()), Some("DAT/VALKYRIA"));
        assert!(find_image_format("tga").is_none());
    }

    #[test]
    fn detect_falls_back_to_embedded_png() {
        let view = ArcView::from_bytes("x.png", embedded::tests::png_header(3, 2));
        match detect_image(&view).unwrap() {
            DecodedImage::Embedded(img) => {
                assert_eq!(img.kind, embedded::EmbeddedKind::Png);
                assert_eq!((img.info.width, img.info.height), (3, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
