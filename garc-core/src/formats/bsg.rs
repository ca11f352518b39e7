//! Bishop `BSS-Graphics` images.
//!
//! A 0x60-byte header (optionally behind a 0x20-byte `BSS-Composition`
//! prefix) describes size, colour mode and compression. Pixel planes are
//! stored bottom-up, either raw, RLE per channel, or control-byte LZ per
//! channel.

use super::ImageFormat;
use crate::codec::{planar_lz, rle};
use crate::container::meta::{BsgMeta, FormatMeta, ImageMetaData};
use crate::error::{GarcError, Result};
use crate::image::data::{DecodedImage, ImageData, PixelFormat};
use crate::read::view::ArcView;
use crate::util::bytes;

const HEADER_SIZE: usize = 0x60;

pub struct BsgFormat;

impl ImageFormat for BsgFormat {
    fn tag(&self) -> &'static str {
        "BSG"
    }

    fn description(&self) -> &'static str {
        "Bishop image format"
    }

    fn read_metadata(&self, view: &ArcView) -> Result<ImageMetaData> {
        let header = view
            .bytes_at(0, HEADER_SIZE)
            .map_err(|_| GarcError::DetectionMiss)?;
        let base = if bytes::ascii_eq(&header, 0, b"BSS-Composition\0") { 0x20 } else { 0 };
        if !bytes::ascii_eq(&header, base, b"BSS-Graphics\0") {
            return Err(GarcError::DetectionMiss);
        }
        let color_mode = header[base + 0x30];
        if color_mode > 2 {
            return Err(GarcError::DetectionMiss);
        }
        let at = |off: usize| bytes::i32_le(&header, base + off);
        let palette_field = at(0x3A)?;
        let mut info = ImageMetaData::new(
            bytes::u16_le(&header, base + 0x16)? as u32,
            bytes::u16_le(&header, base + 0x18)? as u32,
            if color_mode == 2 { 8 } else { 32 },
        );
        info.offset_x = bytes::i16_le(&header, base + 0x20)? as i32;
        info.offset_y = bytes::i16_le(&header, base + 0x22)? as i32;
        let meta = BsgMeta {
            unpacked_size: at(0x12)? as u32,
            color_mode,
            compression_mode: header[base + 0x31],
            data_offset: (at(0x32)? as i64 + base as i64) as u64,
            data_size: at(0x36)? as u32,
            palette_offset: (palette_field as i64 + base as i64) as u64,
            has_palette: palette_field != 0,
        };
        Ok(info.with_extra(FormatMeta::Bsg(meta)))
    }

    fn read(&self, view: &ArcView, info: &ImageMetaData) -> Result<DecodedImage> {
        let FormatMeta::Bsg(meta) = &info.extra else {
            return Err(GarcError::malformed_data("metadata does not describe a BSG image"));
        };
        if meta.compression_mode > 2 {
            return Err(GarcError::unsupported(format!(
                "BSS graphics compression {}",
                meta.compression_mode
            )));
        }
        let format = match meta.color_mode {
            0 => PixelFormat::Bgra32,
            1 => PixelFormat::Bgr32,
            _ if meta.has_palette => PixelFormat::Indexed8,
            _ => PixelFormat::Gray8,
        };
        let palette = match format {
            PixelFormat::Indexed8 => Some(read_palette(view, meta.palette_offset)?),
            _ => None,
        };

        // the header's unpacked size is only a hint; the buffer follows the dimensions
        let stride = info.width as usize * format.bytes_per_pixel();
        let size = stride.checked_mul(info.height as usize).ok_or(GarcError::SizeOverflow)?;
        if meta.unpacked_size as usize != size {
            tracing::debug!(unpacked = meta.unpacked_size, expected = size, "bsg unpacked size differs from dimensions");
        }
        let mut out = vec![0u8; size];
        unpack(view, meta, &mut out)?;

        let mut image = ImageData::new(info.clone(), format, out)?;
        image.flip_vertical();
        if let Some(p) = palette {
            image = image.with_palette(p);
        }
        Ok(DecodedImage::Pixels(image))
    }
}

fn unpack(view: &ArcView, meta: &BsgMeta, out: &mut [u8]) -> Result<()> {
    if meta.data_offset >= view.len() {
        return Err(GarcError::malformed_data("BSG pixel data past end of file"));
    }
    let avail = (view.len() - meta.data_offset) as usize;
    if meta.compression_mode == 0 {
        let data = view.bytes_at(meta.data_offset, avail.min(meta.data_size as usize))?;
        if meta.color_mode == 1 {
            for (src, dst) in data.chunks_exact(3).zip(out.chunks_exact_mut(4)) {
                dst[..3].copy_from_slice(src);
            }
        } else {
            let n = data.len().min(out.len());
            out[..n].copy_from_slice(&data[..n]);
        }
        return Ok(());
    }

    let data = view.bytes_at(meta.data_offset, avail)?;
    let mut input = &data[..];
    let (planes, stride) = match meta.color_mode {
        0 => (4, 4),
        1 => (3, 4),
        _ => (1, 1),
    };
    for plane in 0..planes {
        if meta.compression_mode == 1 {
            rle::unpack_plane(&mut input, out, plane, stride)?;
        } else {
            planar_lz::unpack_plane(&mut input, out, plane, stride)?;
        }
    }
    Ok(())
}

/// 256 BGRX entries.
fn read_palette(view: &ArcView, offset: u64) -> Result<Vec<[u8; 4]>> {
    let raw = view.bytes_at(offset, 0x400)?;
    Ok(raw.chunks_exact(4).map(|c| [c[0], c[1], c[2], 0xFF]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn header(w: u16, h: u16, color: u8, comp: u8, unpacked: usize, data: &[u8], palette: Option<&[u8]>) -> Vec<u8> {
        let mut v = vec![0u8; HEADER_SIZE];
        v[..13].copy_from_slice(b"BSS-Graphics\0");
        v[0x12..0x16].copy_from_slice(&(unpacked as i32).to_le_bytes());
        v[0x16..0x18].copy_from_slice(&w.to_le_bytes());
        v[0x18..0x1A].copy_from_slice(&h.to_le_bytes());
        v[0x20..0x22].copy_from_slice(&(-3i16).to_le_bytes());
        v[0x22..0x24].copy_from_slice(&7i16.to_le_bytes());
        v[0x30] = color;
        v[0x31] = comp;
        v[0x32..0x36].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());
        v[0x36..0x3A].copy_from_slice(&(data.len() as i32).to_le_bytes());
        if let Some(p) = palette {
            let at = HEADER_SIZE + data.len();
            v[0x3A..0x3E].copy_from_slice(&(at as i32).to_le_bytes());
            v.extend_from_slice(data);
            v.extend_from_slice(p);
        } else {
            v.extend_from_slice(data);
        }
        v
    }

    fn decode(raw: Vec<u8>) -> ImageData {
        let view = ArcView::from_bytes("a.bsg", raw);
        let info = BsgFormat.read_metadata(&view).unwrap();
        BsgFormat.read(&view, &info).unwrap().into_pixels().unwrap()
    }

    #[test]
    fn raw_bgra_is_flipped() {
        let rows = [[1u8; 4], [2u8; 4]].concat();
        let img = decode(header(1, 2, 0, 0, 8, &rows, None));
        assert_eq!(img.format, PixelFormat::Bgra32);
        assert_eq!(img.pixels, [2, 2, 2, 2, 1, 1, 1, 1]);
        assert_eq!((img.info.offset_x, img.info.offset_y), (-3, 7));
    }

    #[test]
    fn raw_bgr_fills_32_bit_cells() {
        let img = decode(header(2, 1, 1, 0, 8, &[1, 2, 3, 4, 5, 6], None));
        assert_eq!(img.format, PixelFormat::Bgr32);
        assert_eq!(img.pixels, [1, 2, 3, 0, 4, 5, 6, 0]);
    }

    #[test]
    fn negative_unpacked_size_follows_dimensions() {
        let img = decode(header(1, 1, 0, 0, usize::MAX, &[9, 8, 7, 6], None));
        assert_eq!(img.pixels, [9, 8, 7, 6]);
        assert_eq!(img.pixels.capacity(), 4);
    }

    #[test]
    fn rle_planes_interleave() {
        // 2x1 BGRA; each plane is one literal group of two bytes
        let mut data = Vec::new();
        for c in 0..4u8 {
            data.extend(3i32.to_le_bytes());
            data.extend([1, 0x10 + c, 0x20 + c]);
        }
        let img = decode(header(2, 1, 0, 1, 8, &data, None));
        assert_eq!(img.pixels, [0x10, 0x11, 0x12, 0x13, 0x20, 0x21, 0x22, 0x23]);
    }

    #[test]
    fn lz_gray_plane_with_palette() {
        let samples: Vec<u8> = (0..16).map(|i| (i % 4) as u8 * 3).collect();
        let packed = planar_lz::pack_plane(&samples);
        let palette: Vec<u8> = (0..=255u8).flat_map(|i| [i, i, i, 0]).collect();
        let img = decode(header(4, 4, 2, 2, 16, &packed, Some(&palette)));
        assert_eq!(img.format, PixelFormat::Indexed8);
        assert_eq!(img.palette.as_ref().unwrap()[9], [9, 9, 9, 0xFF]);
        // rows are symmetric top to bottom
        assert_eq!(img.pixels, samples);
    }

    #[rstest]
    #[case(3, 0)]
    #[case(0, 3)]
    fn rejects_unknown_modes(#[case] color: u8, #[case] comp: u8) {
        let view = ArcView::from_bytes("a.bsg", header(1, 1, color, comp, 4, &[0; 4], None));
        let res = BsgFormat
            .read_metadata(&view)
            .and_then(|info| BsgFormat.read(&view, &info));
        assert!(res.is_err());
    }

    #[test]
    fn composition_prefix_shifts_header() {
        let inner = header(1, 1, 2, 0, 1, &[0x42], None);
        let mut raw = b"BSS-Composition\0".to_vec();
        raw.resize(0x20, 0);
        // data offset is relative to the graphics header
        raw.extend(inner);
        let img = decode(raw);
        assert_eq!(img.format, PixelFormat::Gray8);
        assert_eq!(img.pixels, [0x42]);
    }
}
