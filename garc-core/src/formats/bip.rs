//! KID PS2 tiled bitmaps.
//!
//! No magic: detection leans on a handful of header invariants plus a size
//! ratio heuristic that also picks the tile block size and slicing mode.

use super::ImageFormat;
use crate::container::meta::{BipMeta, FormatMeta, ImageMetaData};
use crate::error::{GarcError, Result};
use crate::image::data::{DecodedImage, ImageData, PixelFormat};
use crate::image::tiles::{TileLayout, TileMap, rgba_to_bgra};
use crate::read::view::ArcView;

const MAX_WIDTH: u32 = 2560;
const MAX_HEIGHT: u32 = 1440;
const MIN_SIDE: u32 = 16;

pub struct BipFormat;

impl ImageFormat for BipFormat {
    fn tag(&self) -> &'static str {
        "BIP/PS2"
    }

    fn description(&self) -> &'static str {
        "PS2 tiled bitmap format"
    }

    fn read_metadata(&self, view: &ArcView) -> Result<ImageMetaData> {
        let header = view.u32_at(0)?;
        let (real_sign, multi) = match header {
            5 => (0x14u64, false),
            6..=0xC => (header as u64 * 4, true),
            _ => return Err(GarcError::DetectionMiss),
        };
        let palette_start = view.u16_at(0xC)? as u64;
        let fstart = view.u16_at(0x10)? as u64;
        let bpp = if fstart.wrapping_sub(palette_start) == 1024 { 8 } else { 32 };

        let width = view.u16_at(0x88)? as u32;
        let height = view.u16_at(0x8A)? as u32;
        if width > MAX_WIDTH || height > MAX_HEIGHT || width < MIN_SIDE || height < MIN_SIDE {
            return Err(GarcError::DetectionMiss);
        }
        if (view.u16_at(real_sign)? & 0x3FFF) as u64 != fstart {
            return Err(GarcError::DetectionMiss);
        }
        let sign = view.u16_at(real_sign + 2)?;

        let denominator = match multi {
            true => view.u16_at(0xA2)? as u64 * 1024 + fstart + 0x100,
            false => view.len(),
        };
        let denominator = denominator as f64;
        let mut oversize = width as f64 * height as f64 * 4.0 / denominator;

        let size_sign = view.u16_at(0x90)?;
        let size_high = view.u16_at(0x92)?;
        if size_sign != 0 || size_high == 0 {
            return Err(GarcError::DetectionMiss);
        }
        let pixel_size = ((size_high & 0xFF) as u32 * 0x10000) as f64;

        let mut sliced = true;
        let mut block_size = if oversize > 0.87 {
            sliced = false;
            16
        } else if sign > 0x50 {
            return Err(GarcError::DetectionMiss);
        } else if pixel_size / denominator <= 1.045 && sign != 0x2E && sign != 0x33 {
            32
        } else {
            16
        };

        if bpp == 8 {
            sliced = true;
            oversize = width as f64 * height as f64 / view.len().saturating_sub(fstart) as f64;
            block_size = if oversize > 0.85 || width == 480 || height == 360 { 16 } else { 32 };
        }

        tracing::trace!(width, height, bpp, block_size, sliced, multi, "bip header");
        Ok(ImageMetaData::new(width, height, bpp).with_extra(FormatMeta::Bip(BipMeta {
            block_size,
            sliced,
            multi,
            data_offset: fstart,
            palette_offset: palette_start,
        })))
    }

    fn read(&self, view: &ArcView, info: &ImageMetaData) -> Result<DecodedImage> {
        let FormatMeta::Bip(meta) = &info.extra else {
            return Err(GarcError::malformed_data("metadata does not describe a BIP image"));
        };
        let pixel_bytes = (info.bpp / 8) as usize;
        let map = TileMap::new(
            TileLayout::select(info.bpp, meta.block_size, meta.sliced),
            info.width,
            info.height,
            meta.block_size,
        );
        let stored = (map.source_pixels() as usize).saturating_mul(pixel_bytes);
        let avail = view.len().saturating_sub(meta.data_offset) as usize;
        let data = view.bytes_at(meta.data_offset, stored.min(avail))?;

        let width = info.width as usize;
        let mut pixels = vec![0u8; width * info.height as usize * pixel_bytes];
        for (src, x, y) in map {
            let at = src * pixel_bytes;
            let Some(px) = data.get(at..at + pixel_bytes) else {
                tracing::warn!(stored, available = data.len(), "bip tile data truncated");
                break;
            };
            let dst = (y as usize * width + x as usize) * pixel_bytes;
            if pixel_bytes == 4 {
                pixels[dst..dst + 4].copy_from_slice(&rgba_to_bgra(px));
            } else {
                pixels[dst] = px[0];
            }
        }

        if pixel_bytes == 1 {
            let palette = read_palette(view, meta.palette_offset, meta.block_size == 16)?;
            let image = ImageData::new(info.clone(), PixelFormat::Indexed8, pixels)?.with_palette(palette);
            return Ok(DecodedImage::Pixels(image));
        }
        Ok(DecodedImage::Pixels(ImageData::new(info.clone(), PixelFormat::Bgra32, pixels)?))
    }
}

/// 256 RGBA entries. Small-block images keep alpha as stored; the others
/// use the 7-bit scale.
fn read_palette(view: &ArcView, offset: u64, full_alpha: bool) -> Result<Vec<[u8; 4]>> {
    let raw = view.bytes_at(offset, 0x400)?;
    Ok(raw
        .chunks_exact(4)
        .map(|c| {
            let a = if full_alpha { c[3] } else { c[3].saturating_mul(2) };
            [c[2], c[1], c[0], a]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(palette_start: u16, fstart: u16, w: u16, h: u16) -> Vec<u8> {
        let mut v = vec![0u8; fstart as usize];
        v[..4].copy_from_slice(&5u32.to_le_bytes());
        v[0xC..0xE].copy_from_slice(&palette_start.to_le_bytes());
        v[0x10..0x12].copy_from_slice(&fstart.to_le_bytes());
        v[0x14..0x16].copy_from_slice(&(fstart | 0x4000).to_le_bytes());
        v[0x16..0x18].copy_from_slice(&0x10u16.to_le_bytes());
        v[0x88..0x8A].copy_from_slice(&w.to_le_bytes());
        v[0x8A..0x8C].copy_from_slice(&h.to_le_bytes());
        v[0x92..0x94].copy_from_slice(&1u16.to_le_bytes());
        v
    }

    fn open(raw: Vec<u8>) -> (ArcView, ImageMetaData) {
        let view = ArcView::from_bytes("a.bip", raw);
        let info = BipFormat.read_metadata(&view).unwrap();
        (view, info)
    }

    #[test]
    fn dense_truecolor_is_linear() {
        let mut raw = header(0, 0x100, 512, 16);
        for i in 0..512 * 16u32 {
            raw.extend([i as u8, 1, 2, 0x40]);
        }
        let (view, info) = open(raw);
        let FormatMeta::Bip(meta) = &info.extra else { panic!() };
        assert_eq!((meta.block_size, meta.sliced), (16, false));
        let img = BipFormat.read(&view, &info).unwrap().into_pixels().unwrap();
        assert_eq!(img.format, PixelFormat::Bgra32);
        let at = |x: usize, y: usize| &img.pixels[(y * 512 + x) * 4..][..4];
        assert_eq!(at(0, 0), [2, 1, 0, 0x80]);
        assert_eq!(at(7, 3), [2, 1, (3 * 512 + 7) as u8, 0x80]);
    }

    #[test]
    fn indexed_sliced_image_with_palette() {
        let mut raw = header(0x100, 0x500, 30, 30);
        for i in 0..256u32 {
            let at = 0x100 + i as usize * 4;
            raw[at..at + 4].copy_from_slice(&[i as u8, 0, 0, 0x30]);
        }
        let mut data = vec![0u8; 32 * 1024];
        for y in 0..30 {
            for x in 0..30 {
                data[y * 1024 + x] = (x + y) as u8;
            }
        }
        raw.extend(data);
        let (view, info) = open(raw);
        assert_eq!(info.bpp, 8);
        let FormatMeta::Bip(meta) = &info.extra else { panic!() };
        assert_eq!((meta.block_size, meta.sliced), (32, true));
        let img = BipFormat.read(&view, &info).unwrap().into_pixels().unwrap();
        assert_eq!(img.format, PixelFormat::Indexed8);
        assert_eq!(img.pixels[5 * 30 + 7], 12);
        assert_eq!(img.pixels[29 * 30 + 29], 58);
        assert_eq!(img.palette.as_ref().unwrap()[3], [0, 0, 3, 0x60]);
    }

    #[test]
    fn truncated_tiles_decode_what_is_there() {
        let mut raw = header(0, 0x100, 512, 16);
        raw.extend(vec![0xAB; 512 * 4]);
        let view = ArcView::from_bytes("a.bip", raw);
        let mut info = ImageMetaData::new(512, 16, 32);
        info.extra = FormatMeta::Bip(BipMeta {
            block_size: 16,
            sliced: false,
            multi: false,
            data_offset: 0x100,
            palette_offset: 0,
        });
        let img = BipFormat.read(&view, &info).unwrap().into_pixels().unwrap();
        assert_eq!(&img.pixels[..4], [0xAB, 0xAB, 0xAB, 0xFF]);
        assert_eq!(&img.pixels[512 * 4..512 * 4 + 4], [0, 0, 0, 0]);
    }

    #[test]
    fn header_invariants_gate_detection() {
        let mut raw = header(0, 0x100, 512, 16);
        raw.extend(vec![0; 512 * 16 * 4]);
        let check = |f: &dyn Fn(&mut Vec<u8>)| -> bool {
            let mut r = raw.clone();
            f(&mut r);
            BipFormat.read_metadata(&ArcView::from_bytes("a.bip", r)).is_err()
        };
        assert!(check(&|r: &mut Vec<u8>| r[0] = 4));
        assert!(check(&|r: &mut Vec<u8>| r[0] = 0xD));
        assert!(check(&|r: &mut Vec<u8>| r[0x88..0x8A].copy_from_slice(&8u16.to_le_bytes())));
        assert!(check(&|r: &mut Vec<u8>| r[0x14] = 0x20));
        assert!(check(&|r: &mut Vec<u8>| r[0x92..0x94].copy_from_slice(&0u16.to_le_bytes())));
        assert!(!check(&|_: &mut Vec<u8>| {}));
    }
}
