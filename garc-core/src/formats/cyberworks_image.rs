//! Cyberworks raw picture entries (type bytes 0x61 and 0x64).
//!
//! Header: type at 0, base reference `u64` at 1, width and height at 9 and
//! 0xD, flag byte at 0x11. Size-prefixed buffers follow; their placement
//! depends on the variant.

use crate::container::meta::{CyberworksMeta, FormatMeta, ImageMetaData};
use crate::error::{GarcError, Result};
use crate::image::data::{ImageData, PixelFormat};
use crate::image::delta;
use crate::util::bytes;

pub const TYPE_PLAIN: u8 = 0x61;
pub const TYPE_ALPHA_DELTA: u8 = 0x64;

/// Base references keep extra tag bits above this modulus.
const BASE_INDEX_MODULUS: u64 = 10_000_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Variant {
    Pure,
    HasBase,
    ExtendedAlpha,
    AlphaDelta,
}

fn variant(meta: &CyberworksMeta) -> Result<Variant> {
    match (meta.image_type, meta.flag) {
        (TYPE_ALPHA_DELTA, _) => Ok(Variant::AlphaDelta),
        (TYPE_PLAIN, 0) => Ok(Variant::Pure),
        (TYPE_PLAIN, 1) => Ok(Variant::HasBase),
        (TYPE_PLAIN, f) if f & 2 != 0 && f & 4 != 0 => Ok(Variant::ExtendedAlpha),
        (t, f) => Err(GarcError::unsupported(format!(
            "cyberworks image type 0x{t:02X} flag 0x{f:02X}"
        ))),
    }
}

pub fn read_metadata(data: &[u8]) -> Result<ImageMetaData> {
    let image_type = bytes::u8_at(data, 0)?;
    if image_type != TYPE_PLAIN && image_type != TYPE_ALPHA_DELTA {
        return Err(GarcError::DetectionMiss);
    }
    let width = bytes::u32_le(data, 9)?;
    let height = bytes::u32_le(data, 0xD)?;
    let flag = bytes::u8_at(data, 0x11)?;
    let base_index = if image_type == TYPE_ALPHA_DELTA || flag == 1 {
        Some((bytes::u64_le(data, 1)? % BASE_INDEX_MODULUS) as usize)
    } else {
        None
    };
    Ok(ImageMetaData::new(width, height, 32).with_extra(FormatMeta::Cyberworks(CyberworksMeta {
        image_type,
        flag,
        base_index,
    })))
}

/// `i32` length at `at` followed by that many bytes.
fn sized(data: &[u8], at: usize) -> Result<&[u8]> {
    let len = bytes::i32_le(data, at)?;
    let len = usize::try_from(len)
        .map_err(|_| GarcError::malformed_data(format!("negative buffer size at 0x{at:X}")))?;
    data.get(at + 4..at + 4 + len)
        .ok_or_else(|| GarcError::malformed_data(format!("buffer at 0x{at:X} runs past the entry")))
}

fn row_padding(width: usize) -> usize {
    ((width * 3 + 3) & !3) - width * 3
}

/// Decode an entry. Variants with a base reference need the base image,
/// already expanded to BGRA, in `base`; its dimensions replace the header's.
pub fn decode(data: &[u8], info: &ImageMetaData, base: Option<ImageData>) -> Result<ImageData> {
    let FormatMeta::Cyberworks(meta) = &info.extra else {
        return Err(GarcError::malformed_data("metadata does not describe a cyberworks image"));
    };
    let variant = variant(meta)?;
    let (mut info, pixels) = match (variant, base) {
        (Variant::Pure, _) => (info.clone(), pure(data, info)?),
        (Variant::ExtendedAlpha, _) => (info.clone(), extended_alpha(data, info)?),
        (Variant::HasBase | Variant::AlphaDelta, None) => {
            return Err(GarcError::malformed_data("change-set image decoded without its base"));
        }
        (Variant::HasBase, Some(base)) => {
            let mut canvas = base.to_bgra32();
            let mask = sized(data, 0x19)?;
            let delta = sized(data, 0x1D + mask.len())?;
            delta::composite(&mut canvas, mask, delta, None, true)?;
            (sized_like(info, &base), canvas)
        }
        (Variant::AlphaDelta, Some(base)) => {
            let mut canvas = base.to_bgra32();
            let alpha = sized(data, 0x15)?;
            let mask = sized(data, 0x19 + alpha.len())?;
            let bgr = sized(data, 0x1D + alpha.len() + mask.len())?;
            delta::composite(&mut canvas, mask, bgr, Some(alpha), false)?;
            (sized_like(info, &base), canvas)
        }
    };
    info.bpp = 32;
    ImageData::new(info, PixelFormat::Bgra32, pixels)
}

fn sized_like(info: &ImageMetaData, base: &ImageData) -> ImageMetaData {
    let mut info = info.clone();
    info.width = base.width();
    info.height = base.height();
    info
}

fn pure(data: &[u8], info: &ImageMetaData) -> Result<Vec<u8>> {
    let (w, h) = (info.width as usize, info.height as usize);
    let area = w.checked_mul(h).ok_or(GarcError::SizeOverflow)?;
    let buf = sized(data, 0x1D)?;
    if buf.len() == area {
        return Ok(buf.iter().flat_map(|&g| [g; 4]).collect());
    }
    if buf.len() < area.checked_mul(3).ok_or(GarcError::SizeOverflow)? {
        return Err(GarcError::unsupported(format!(
            "cyberworks pixel buffer of {} bytes for {w}x{h}",
            buf.len()
        )));
    }
    let padding = row_padding(w);
    let mut out = Vec::with_capacity(area * 4);
    let mut src = 0;
    for _ in 0..h {
        for _ in 0..w {
            let px = buf
                .get(src..src + 3)
                .ok_or_else(|| GarcError::malformed_data("cyberworks BGR rows truncated"))?;
            out.extend_from_slice(px);
            out.push(0xFF);
            src += 3;
        }
        src += padding;
    }
    Ok(out)
}

/// Separate alpha buffer addressed with the BGR byte offset.
fn extended_alpha(data: &[u8], info: &ImageMetaData) -> Result<Vec<u8>> {
    let (w, h) = (info.width as usize, info.height as usize);
    let alpha = sized(data, 0x15)?;
    let bgr = sized(data, 0x1D + alpha.len())?;
    let padding = row_padding(w);
    let short = || GarcError::malformed_data("cyberworks alpha image truncated");
    let mut out = Vec::with_capacity(w.saturating_mul(h).saturating_mul(4));
    let mut src = 0;
    for _ in 0..h {
        for _ in 0..w {
            out.extend_from_slice(bgr.get(src..src + 3).ok_or_else(short)?);
            out.push(*alpha.get(src).ok_or_else(short)?);
            src += 3;
        }
        src += padding;
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Header with the given type, base reference, size and flag; 0x15 bytes.
    pub(crate) fn header(image_type: u8, base: u64, w: u32, h: u32, flag: u8) -> Vec<u8> {
        let mut v = vec![image_type];
        v.extend(base.to_le_bytes());
        v.extend(w.to_le_bytes());
        v.extend(h.to_le_bytes());
        v.push(flag);
        v.extend([0u8; 3]);
        v
    }

    pub(crate) fn push_sized(v: &mut Vec<u8>, buf: &[u8]) {
        v.extend((buf.len() as i32).to_le_bytes());
        v.extend_from_slice(buf);
    }

    /// Base-less picture with a `w*h*3` BGR buffer (rows padded to 4 bytes).
    pub(crate) fn pure_bgr(w: u32, h: u32, fill: u8) -> Vec<u8> {
        let mut v = header(TYPE_PLAIN, 0, w, h, 0);
        v.extend([0u8; 8]);
        let row = (w as usize * 3 + 3) & !3;
        push_sized(&mut v, &vec![fill; row * h as usize]);
        v
    }

    /// Change-set against `base` for type 0x61 flag 1.
    pub(crate) fn diff(base: u64, w: u32, h: u32, mask: &[u8], delta: &[u8]) -> Vec<u8> {
        let mut v = header(TYPE_PLAIN, base, w, h, 1);
        v.extend([0u8; 4]);
        push_sized(&mut v, mask);
        push_sized(&mut v, delta);
        v
    }

    fn decode_plain(data: &[u8]) -> Result<ImageData> {
        let info = read_metadata(data)?;
        decode(data, &info, None)
    }

    #[test]
    fn grayscale_fills_all_channels() {
        let mut v = header(TYPE_PLAIN, 0, 2, 1, 0);
        v.extend([0u8; 8]);
        push_sized(&mut v, &[0x10, 0x80]);
        let img = decode_plain(&v).unwrap();
        assert_eq!(img.pixels, [0x10, 0x10, 0x10, 0x10, 0x80, 0x80, 0x80, 0x80]);
    }

    #[test]
    fn bgr_rows_skip_padding() {
        let mut v = header(TYPE_PLAIN, 0, 1, 2, 0);
        v.extend([0u8; 8]);
        push_sized(&mut v, &[1, 2, 3, 0, 4, 5, 6, 0]);
        let img = decode_plain(&v).unwrap();
        assert_eq!(img.pixels, [1, 2, 3, 0xFF, 4, 5, 6, 0xFF]);
    }

    #[test]
    fn odd_buffer_size_is_unsupported() {
        let mut v = header(TYPE_PLAIN, 0, 2, 2, 0);
        v.extend([0u8; 8]);
        push_sized(&mut v, &[0; 7]);
        assert!(matches!(decode_plain(&v), Err(GarcError::UnsupportedVariant(_))));
    }

    #[test]
    fn extended_alpha_reads_alpha_at_colour_offsets() {
        let mut v = header(TYPE_PLAIN, 0, 2, 1, 6);
        v.truncate(0x15);
        push_sized(&mut v, &[0xA0, 0, 0, 0xB0, 0, 0, 0, 0]);
        v.extend([0u8; 4]);
        push_sized(&mut v, &[1, 2, 3, 4, 5, 6, 0, 0]);
        let img = decode_plain(&v).unwrap();
        assert_eq!(img.pixels, [1, 2, 3, 0xA0, 4, 5, 6, 0xB0]);
    }

    #[test]
    fn base_reference_drops_tag_bits() {
        let info = read_metadata(&diff(30_000_007, 4, 4, &[0, 0], &[])).unwrap();
        let FormatMeta::Cyberworks(meta) = info.extra else { panic!() };
        assert_eq!(meta.base_index, Some(7));
        let info = read_metadata(&pure_bgr(1, 1, 0)).unwrap();
        let FormatMeta::Cyberworks(meta) = info.extra else { panic!() };
        assert_eq!(meta.base_index, None);
    }

    #[test]
    fn alpha_delta_overlays_colour_and_alpha() {
        let base = ImageData::new(ImageMetaData::new(2, 1, 32), PixelFormat::Bgra32, vec![9; 8]).unwrap();
        let mut v = header(TYPE_ALPHA_DELTA, 0, 0, 0, 0);
        v.truncate(0x15);
        push_sized(&mut v, &[0x40]);
        push_sized(&mut v, &[0b10]);
        push_sized(&mut v, &[7, 8, 6]);
        let info = read_metadata(&v).unwrap();
        let img = decode(&v, &info, Some(base)).unwrap();
        assert_eq!((img.width(), img.height()), (2, 1));
        assert_eq!(img.pixels, [9, 9, 9, 9, 7, 8, 6, 0x40]);
    }
}
