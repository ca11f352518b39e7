use super::embedded::EmbeddedKind;
use crate::container::meta::ImageMetaData;
use crate::error::{GarcError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgra32,
    /// BGR in 32-bit cells, fourth byte unused.
    Bgr32,
    Gray8,
    Indexed8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra32 | PixelFormat::Bgr32 => 4,
            PixelFormat::Gray8 | PixelFormat::Indexed8 => 1,
        }
    }
}

/// Decoded raster, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub info: ImageMetaData,
    pub format: PixelFormat,
    pub stride: usize,
    pub pixels: Vec<u8>,
    /// BGRA entries for `Indexed8`.
    pub palette: Option<Vec<[u8; 4]>>,
}

impl ImageData {
    pub fn new(info: ImageMetaData, format: PixelFormat, pixels: Vec<u8>) -> Result<Self> {
        let stride = info.width as usize * format.bytes_per_pixel();
        let expected = stride
            .checked_mul(info.height as usize)
            .ok_or(GarcError::SizeOverflow)?;
        if pixels.len() != expected {
            return Err(GarcError::malformed_data(format!(
                "pixel buffer holds {} bytes, {}x{} {:?} needs {}",
                pixels.len(),
                info.width,
                info.height,
                format,
                expected
            )));
        }
        Ok(Self {
            info,
            format,
            stride,
            pixels,
            palette: None,
        })
    }

    pub fn with_palette(mut self, palette: Vec<[u8; 4]>) -> Self {
        self.palette = Some(palette);
        self
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    /// Reverse row order in place.
    pub fn flip_vertical(&mut self) {
        let rows = self.info.height as usize;
        for y in 0..rows / 2 {
            let (top, bottom) = self.pixels.split_at_mut((rows - 1 - y) * self.stride);
            top[y * self.stride..(y + 1) * self.stride].swap_with_slice(&mut bottom[..self.stride]);
        }
    }

    /// Expand to tightly packed BGRA.
    pub fn to_bgra32(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Bgra32 => self.pixels.clone(),
            PixelFormat::Bgr32 => self
                .pixels
                .chunks_exact(4)
                .flat_map(|p| [p[0], p[1], p[2], 0xFF])
                .collect(),
            PixelFormat::Gray8 => self.pixels.iter().flat_map(|&g| [g, g, g, 0xFF]).collect(),
            PixelFormat::Indexed8 => {
                let gray;
                let palette = match &self.palette {
                    Some(p) => p.as_slice(),
                    None => {
                        gray = (0..=255u8).map(|g| [g, g, g, 0xFF]).collect::<Vec<_>>();
                        gray.as_slice()
                    }
                };
                self.pixels
                    .iter()
                    .flat_map(|&i| palette.get(i as usize).copied().unwrap_or([0, 0, 0, 0xFF]))
                    .collect()
            }
        }
    }
}

/// Image payload stored in a standard container format (PNG, JPEG, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub kind: EmbeddedKind,
    pub info: ImageMetaData,
    pub data: Vec<u8>,
    /// Separate alpha plane, itself an embedded image.
    pub alpha: Option<Vec<u8>>,
    /// Rows of the embedded picture are stored bottom-up.
    pub flip_vertical: bool,
}

impl EmbeddedImage {
    /// Decode the payload to BGRA, merge the alpha picture and restore row
    /// order. The result keeps this image's metadata.
    pub fn to_pixels(&self) -> Result<ImageData> {
        let mut image = self.kind.decode(&self.data)?;
        if let Some(alpha) = &self.alpha {
            let kind = EmbeddedKind::sniff(alpha).unwrap_or(self.kind);
            let mask = kind.decode(alpha)?;
            if (mask.width(), mask.height()) == (image.width(), image.height()) {
                for (px, m) in image.pixels.chunks_exact_mut(4).zip(mask.pixels.chunks_exact(4)) {
                    px[3] = luma(m);
                }
            } else {
                tracing::debug!(
                    image = ?(image.width(), image.height()),
                    alpha = ?(mask.width(), mask.height()),
                    "alpha picture size differs, dropping it"
                );
                image.format = PixelFormat::Bgr32;
            }
        }
        if self.flip_vertical {
            image.flip_vertical();
        }
        image.info = ImageMetaData {
            width: image.width(),
            height: image.height(),
            bpp: 32,
            ..self.info.clone()
        };
        Ok(image)
    }
}

/// Gray level of a BGRA pixel.
fn luma(px: &[u8]) -> u8 {
    let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
    ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedImage {
    Pixels(ImageData),
    Embedded(EmbeddedImage),
}

impl DecodedImage {
    pub fn info(&self) -> &ImageMetaData {
        match self {
            DecodedImage::Pixels(img) => &img.info,
            DecodedImage::Embedded(img) => &img.info,
        }
    }

    pub fn into_pixels(self) -> Result<ImageData> {
        match self {
            DecodedImage::Pixels(img) => Ok(img),
            DecodedImage::Embedded(img) => img.to_pixels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::embedded::tests::bmp;

    fn gray(w: u32, h: u32, pixels: Vec<u8>) -> ImageData {
        ImageData::new(ImageMetaData::new(w, h, 8), PixelFormat::Gray8, pixels).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let err = ImageData::new(ImageMetaData::new(2, 2, 32), PixelFormat::Bgra32, vec![0; 15]);
        assert!(matches!(err, Err(GarcError::MalformedData(_))));
    }

    #[test]
    fn flips_rows() {
        let mut img = gray(2, 3, vec![1, 1, 2, 2, 3, 3]);
        img.flip_vertical();
        assert_eq!(img.pixels, vec![3, 3, 2, 2, 1, 1]);
    }

    fn embedded(data: Vec<u8>, alpha: Option<Vec<u8>>, flip_vertical: bool) -> EmbeddedImage {
        let mut info = ImageMetaData::new(2, 2, 32);
        info.offset_x = 5;
        EmbeddedImage {
            kind: EmbeddedKind::sniff(&data).unwrap(),
            info,
            data,
            alpha,
            flip_vertical,
        }
    }

    // 2x2 24-bit, bottom row first
    const ROWS: [u8; 16] = [1, 1, 1, 2, 2, 2, 0, 0, 3, 3, 3, 4, 4, 4, 0, 0];

    #[test]
    fn embedded_payload_decodes_with_its_metadata() {
        let img = DecodedImage::Embedded(embedded(bmp(2, 2, 24, &ROWS), None, false))
            .into_pixels()
            .unwrap();
        assert_eq!(img.format, PixelFormat::Bgra32);
        assert_eq!(img.info.offset_x, 5);
        assert_eq!(img.pixels[..4], [3, 3, 3, 0xFF]);
    }

    #[test]
    fn alpha_picture_fills_alpha_channel_then_rows_flip() {
        let alpha = bmp(2, -2, 24, &[10, 10, 10, 20, 20, 20, 0, 0, 30, 30, 30, 40, 40, 40, 0, 0]);
        let img = embedded(bmp(2, 2, 24, &ROWS), Some(alpha), true).to_pixels().unwrap();
        assert_eq!(img.format, PixelFormat::Bgra32);
        assert_eq!(img.pixels, [1, 1, 1, 30, 2, 2, 2, 40, 3, 3, 3, 10, 4, 4, 4, 20]);
    }

    #[test]
    fn mismatched_alpha_picture_leaves_image_opaque() {
        let alpha = bmp(1, 1, 24, &[0, 0, 0, 0]);
        let img = embedded(bmp(2, 2, 24, &ROWS), Some(alpha), false).to_pixels().unwrap();
        assert_eq!(img.format, PixelFormat::Bgr32);
        assert!(img.to_bgra32().chunks_exact(4).all(|p| p[3] == 0xFF));
    }

    #[test]
    fn expands_indexed_through_palette() {
        let mut img = gray(2, 1, vec![0, 1]);
        img.format = PixelFormat::Indexed8;
        let img = img.with_palette(vec![[1, 2, 3, 4], [5, 6, 7, 8]]);
        assert_eq!(img.to_bgra32(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
