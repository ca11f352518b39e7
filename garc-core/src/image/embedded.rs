//! Standard image payloads carried inside proprietary wrappers: sniffing,
//! header parsing and decoding to BGRA.

use super::data::{ImageData, PixelFormat};
use crate::container::meta::{FormatMeta, ImageMetaData};
use crate::error::{GarcError, Result};
use crate::util::bytes::{i32_le, u16_le, u32_be, u32_le};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
pub const JPEG_SIGNATURE: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EmbeddedKind {
    Png,
    Jpeg,
    Bmp,
}

impl EmbeddedKind {
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&PNG_SIGNATURE) {
            Some(EmbeddedKind::Png)
        } else if data.starts_with(&JPEG_SIGNATURE) {
            Some(EmbeddedKind::Jpeg)
        } else if data.starts_with(b"BM") && data.len() >= 0x1E {
            Some(EmbeddedKind::Bmp)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EmbeddedKind::Png => "PNG",
            EmbeddedKind::Jpeg => "JPEG",
            EmbeddedKind::Bmp => "BMP",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            EmbeddedKind::Png => "png",
            EmbeddedKind::Jpeg => "jpg",
            EmbeddedKind::Bmp => "bmp",
        }
    }

    /// Parse dimensions from the payload header.
    pub fn read_metadata(self, data: &[u8]) -> Result<ImageMetaData> {
        let info = match self {
            EmbeddedKind::Png => png_metadata(data)?,
            EmbeddedKind::Jpeg => jpeg_metadata(data)?,
            EmbeddedKind::Bmp => bmp_metadata(data)?,
        };
        Ok(info.with_extra(FormatMeta::Embedded(self)))
    }

    /// Decode the payload into a top-down BGRA raster.
    pub fn decode(self, data: &[u8]) -> Result<ImageData> {
        let (width, height, pixels) = match self {
            EmbeddedKind::Png => decode_png(data)?,
            EmbeddedKind::Jpeg => decode_jpeg(data)?,
            EmbeddedKind::Bmp => decode_bmp(data)?,
        };
        tracing::trace!(kind = self.name(), width, height, "embedded payload decoded");
        let info = ImageMetaData::new(width, height, 32).with_extra(FormatMeta::Embedded(self));
        ImageData::new(info, PixelFormat::Bgra32, pixels)
    }
}

/// Identify and parse `data` in one step.
pub fn detect(data: &[u8]) -> Result<ImageMetaData> {
    EmbeddedKind::sniff(data)
        .ok_or(GarcError::DetectionMiss)?
        .read_metadata(data)
}

fn png_metadata(data: &[u8]) -> Result<ImageMetaData> {
    if data.get(12..16) != Some(b"IHDR") {
        return Err(GarcError::malformed_data("PNG without leading IHDR"));
    }
    let width = u32_be(data, 16)?;
    let height = u32_be(data, 20)?;
    let depth = *data.get(24).ok_or_else(|| GarcError::malformed_data("short IHDR"))? as u32;
    let channels = match data.get(25) {
        Some(0) | Some(3) => 1,
        Some(4) => 2,
        Some(2) => 3,
        Some(6) => 4,
        _ => return Err(GarcError::malformed_data("PNG colour type")),
    };
    Ok(ImageMetaData::new(width, height, depth * channels))
}

fn jpeg_metadata(data: &[u8]) -> Result<ImageMetaData> {
    let mut pos = 2;
    loop {
        while data.get(pos) == Some(&0xFF) {
            pos += 1;
        }
        let marker = *data
            .get(pos)
            .ok_or_else(|| GarcError::malformed_data("JPEG without frame header"))?;
        pos += 1;
        let seg_len = u16::from_be_bytes([
            *data.get(pos).ok_or_else(|| GarcError::malformed_data("JPEG segment"))?,
            *data.get(pos + 1).ok_or_else(|| GarcError::malformed_data("JPEG segment"))?,
        ]) as usize;
        // SOF0..SOF15 except DHT, JPG and DAC
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            let seg = data
                .get(pos + 2..pos + 8)
                .ok_or_else(|| GarcError::malformed_data("JPEG frame header truncated"))?;
            let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            let bpp = seg[0] as u32 * seg[5] as u32;
            return Ok(ImageMetaData::new(width, height, bpp));
        }
        if marker == 0xDA || seg_len < 2 {
            return Err(GarcError::malformed_data("JPEG without frame header"));
        }
        pos += seg_len;
    }
}

fn bmp_metadata(data: &[u8]) -> Result<ImageMetaData> {
    let width = i32_le(data, 0x12)?;
    let height = i32_le(data, 0x16)?;
    let bpp = u16_le(data, 0x1C)? as u32;
    if width <= 0 || height == 0 || u32_le(data, 0x0E)? < 12 {
        return Err(GarcError::malformed_data("BMP header"));
    }
    Ok(ImageMetaData::new(width as u32, height.unsigned_abs(), bpp))
}

/// Interleaved 8-bit gray, gray+alpha, RGB or RGBA samples to BGRA.
fn samples_to_bgra(samples: &[u8], channels: usize) -> Result<Vec<u8>> {
    Ok(match channels {
        1 => samples.iter().flat_map(|&g| [g, g, g, 0xFF]).collect(),
        2 => samples.chunks_exact(2).flat_map(|p| [p[0], p[0], p[0], p[1]]).collect(),
        3 => samples.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0], 0xFF]).collect(),
        4 => samples.chunks_exact(4).flat_map(|p| [p[2], p[1], p[0], p[3]]).collect(),
        n => return Err(GarcError::unsupported(format!("{n} samples per pixel"))),
    })
}

fn decode_png(data: &[u8]) -> Result<(u32, u32, Vec<u8>)> {
    let fail = |e: png::DecodingError| GarcError::malformed_data(format!("PNG payload: {e}"));
    let mut decoder = png::Decoder::new(data);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(fail)?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).map_err(fail)?;
    let channels = match frame.color_type {
        png::ColorType::Grayscale => 1,
        png::ColorType::GrayscaleAlpha => 2,
        png::ColorType::Rgb => 3,
        png::ColorType::Rgba => 4,
        png::ColorType::Indexed => return Err(GarcError::malformed_data("PNG palette left unexpanded")),
    };
    let pixels = samples_to_bgra(&buf[..frame.buffer_size()], channels)?;
    Ok((frame.width, frame.height, pixels))
}

fn decode_jpeg(data: &[u8]) -> Result<(u32, u32, Vec<u8>)> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let samples = decoder
        .decode()
        .map_err(|e| GarcError::malformed_data(format!("JPEG payload: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| GarcError::malformed_data("JPEG without frame header"))?;
    let pixels = match info.pixel_format {
        jpeg_decoder::PixelFormat::L8 => samples_to_bgra(&samples, 1)?,
        jpeg_decoder::PixelFormat::RGB24 => samples_to_bgra(&samples, 3)?,
        other => return Err(GarcError::unsupported(format!("JPEG pixel format {other:?}"))),
    };
    Ok((info.width as u32, info.height as u32, pixels))
}

/// Uncompressed 8-bit paletted, 24-bit and 32-bit bitmaps.
fn decode_bmp(data: &[u8]) -> Result<(u32, u32, Vec<u8>)> {
    let info = bmp_metadata(data)?;
    let header_size = u32_le(data, 0x0E)? as usize;
    let compression = u32_le(data, 0x1E)?;
    if header_size < 40 || compression != 0 {
        return Err(GarcError::unsupported(format!(
            "BMP header size {header_size} compression {compression}"
        )));
    }
    let bytes_per_pixel = match info.bpp {
        8 | 24 | 32 => info.bpp as usize / 8,
        n => return Err(GarcError::unsupported(format!("{n}-bit BMP"))),
    };
    let palette: Vec<[u8; 4]> = if bytes_per_pixel == 1 {
        let count = match u32_le(data, 0x2E)? {
            0 => 256,
            n => n.min(256) as usize,
        };
        let at = 0x0E + header_size;
        data.get(at..at + count * 4)
            .ok_or_else(|| GarcError::malformed_data("BMP palette truncated"))?
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], 0xFF])
            .collect()
    } else {
        Vec::new()
    };

    let (w, h) = (info.width as usize, info.height as usize);
    let used = w.checked_mul(bytes_per_pixel).ok_or(GarcError::SizeOverflow)?;
    let row_len = (used + 3) & !3;
    let pixel_start = u32_le(data, 0x0A)? as usize;
    let bottom_up = i32_le(data, 0x16)? > 0;
    let short = || GarcError::malformed_data("BMP pixel rows truncated");
    // every pixel takes at least one byte of the payload
    let mut out = Vec::with_capacity(w.saturating_mul(h).min(data.len()) * 4);
    for y in 0..h {
        let src_y = if bottom_up { h - 1 - y } else { y };
        let start = src_y
            .checked_mul(row_len)
            .and_then(|off| off.checked_add(pixel_start))
            .ok_or(GarcError::SizeOverflow)?;
        let row = data.get(start..).and_then(|r| r.get(..used)).ok_or_else(short)?;
        match bytes_per_pixel {
            1 => out.extend(
                row.iter()
                    .flat_map(|&i| palette.get(i as usize).copied().unwrap_or([0, 0, 0, 0xFF])),
            ),
            3 => out.extend(row.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 0xFF])),
            // fourth byte of an uncompressed 32-bit bitmap is unused
            _ => out.extend(row.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2], 0xFF])),
        }
    }
    Ok((info.width, info.height, out))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal PNG header (signature + IHDR) for payload tests.
    pub(crate) fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut v = PNG_SIGNATURE.to_vec();
        v.extend(13u32.to_be_bytes());
        v.extend(b"IHDR");
        v.extend(width.to_be_bytes());
        v.extend(height.to_be_bytes());
        v.extend([8, 6, 0, 0, 0]);
        v.extend([0; 4]);
        v
    }

    /// Encoded 8-bit PNG.
    pub(crate) fn png_image(width: u32, height: u32, color: png::ColorType, samples: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(samples).unwrap();
        writer.finish().unwrap();
        out
    }

    /// Uncompressed bitmap with a 40-byte info header; `pixel_area` is stored as given.
    pub(crate) fn bmp(width: i32, height: i32, bpp: u16, pixel_area: &[u8]) -> Vec<u8> {
        let mut v = b"BM".to_vec();
        v.extend((54 + pixel_area.len() as u32).to_le_bytes());
        v.extend([0u8; 4]);
        v.extend(54u32.to_le_bytes());
        v.extend(40u32.to_le_bytes());
        v.extend(width.to_le_bytes());
        v.extend(height.to_le_bytes());
        v.extend(1u16.to_le_bytes());
        v.extend(bpp.to_le_bytes());
        v.extend([0u8; 24]);
        v.extend_from_slice(pixel_area);
        v
    }

    #[test]
    fn decodes_rgb_png_to_bgra() {
        let png = png_image(2, 1, png::ColorType::Rgb, &[10, 20, 30, 40, 50, 60]);
        let img = EmbeddedKind::sniff(&png).unwrap().decode(&png).unwrap();
        assert_eq!(img.format, PixelFormat::Bgra32);
        assert_eq!((img.width(), img.height()), (2, 1));
        assert_eq!(img.pixels, [30, 20, 10, 0xFF, 60, 50, 40, 0xFF]);
        assert_eq!(img.info.extra, FormatMeta::Embedded(EmbeddedKind::Png));
    }

    #[test]
    fn gray_alpha_png_keeps_alpha() {
        let png = png_image(1, 1, png::ColorType::GrayscaleAlpha, &[7, 128]);
        let img = EmbeddedKind::Png.decode(&png).unwrap();
        assert_eq!(img.pixels, [7, 7, 7, 128]);
    }

    #[test]
    fn header_only_png_does_not_decode() {
        let res = EmbeddedKind::Png.decode(&png_header(4, 4));
        assert!(matches!(res, Err(GarcError::MalformedData(_))));
    }

    #[test]
    fn truncated_jpeg_does_not_decode() {
        let jpg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46];
        assert!(matches!(EmbeddedKind::Jpeg.decode(&jpg), Err(GarcError::MalformedData(_))));
    }

    #[test]
    fn bottom_up_bmp_rows_are_reversed() {
        // 2x2, 24-bit rows padded to 8 bytes, bottom row first
        let area = [1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0];
        let raw = bmp(2, 2, 24, &area);
        let img = EmbeddedKind::sniff(&raw).unwrap().decode(&raw).unwrap();
        assert_eq!(
            img.pixels,
            [7, 8, 9, 0xFF, 10, 11, 12, 0xFF, 1, 2, 3, 0xFF, 4, 5, 6, 0xFF]
        );
    }

    #[test]
    fn top_down_bmp_ignores_fourth_byte() {
        let img = EmbeddedKind::Bmp.decode(&bmp(1, -2, 32, &[1, 2, 3, 0, 4, 5, 6, 0])).unwrap();
        assert_eq!(img.pixels, [1, 2, 3, 0xFF, 4, 5, 6, 0xFF]);
    }

    #[test]
    fn short_bmp_rows_are_rejected() {
        let res = EmbeddedKind::Bmp.decode(&bmp(4, 4, 24, &[0; 20]));
        assert!(matches!(res, Err(GarcError::MalformedData(_))));
    }

    #[test]
    fn reads_png_ihdr() {
        let info = detect(&png_header(640, 480)).unwrap();
        assert_eq!((info.width, info.height, info.bpp), (640, 480, 32));
        assert_eq!(info.extra, FormatMeta::Embedded(EmbeddedKind::Png));
    }

    #[test]
    fn walks_jpeg_segments_to_sof() {
        let mut jpg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46];
        jpg.extend([0xFF, 0xC0, 0x00, 0x11, 0x08, 0x01, 0xE0, 0x02, 0x80, 0x03]);
        let info = detect(&jpg).unwrap();
        assert_eq!((info.width, info.height, info.bpp), (640, 480, 24));
    }

    #[test]
    fn unknown_payload_is_a_miss() {
        assert!(matches!(detect(b"GIF89a......"), Err(GarcError::DetectionMiss)));
    }
}
