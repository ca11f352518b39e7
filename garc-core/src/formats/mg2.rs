//! Valkyria `MICO` images: an encrypted PNG or JPEG payload, optionally
//! followed by an encrypted alpha picture.
//!
//! The 16-byte header may itself be obfuscated with a keystream seeded from
//! the file length. The payload cipher revision is not recorded and is found
//! by trial decryption.

use super::ImageFormat;
use crate::container::meta::{FormatMeta, ImageMetaData, Mg2Meta};
use crate::crypto::keystream;
use crate::crypto::mg2::{Mg2Reader, Mg2Scheme};
use crate::error::{GarcError, Result};
use crate::image::data::{DecodedImage, EmbeddedImage};
use crate::image::embedded::{EmbeddedKind, JPEG_SIGNATURE, PNG_SIGNATURE};
use crate::read::view::ArcView;
use crate::util::bytes;
use std::io::Read;

const HEADER_SIZE: usize = 0x10;
/// Enough of the payload to reach the size fields of either container.
const TRIAL_HEAD_SIZE: usize = 0x10000;

pub struct Mg2Format;

impl ImageFormat for Mg2Format {
    fn tag(&self) -> &'static str {
        "MG2"
    }

    fn description(&self) -> &'static str {
        "Valkyria image format"
    }

    fn read_metadata(&self, view: &ArcView) -> Result<ImageMetaData> {
        let mut header = view
            .bytes_at(0, HEADER_SIZE)
            .map_err(|_| GarcError::DetectionMiss)?;
        if !header.starts_with(b"MICO") {
            keystream::deobfuscate(&mut header, view.len() as u32);
            if !header.starts_with(b"MICO") {
                return Err(GarcError::DetectionMiss);
            }
        }
        if !bytes::ascii_eq(&header, 4, b"CG01") && !bytes::ascii_eq(&header, 4, b"CG02") {
            return Err(GarcError::DetectionMiss);
        }
        let length = u32::try_from(bytes::i32_le(&header, 8)?).map_err(|_| GarcError::DetectionMiss)?;
        let alpha_length = bytes::i32_le(&header, 12)?.max(0) as u32;

        let avail = view.len().saturating_sub(HEADER_SIZE as u64) as usize;
        let head = view.bytes_at(HEADER_SIZE as u64, (length as usize).min(TRIAL_HEAD_SIZE).min(avail))?;
        for scheme in Mg2Scheme::ALL {
            let mut trial = head.clone();
            scheme.cipher(length, length).apply(0, &mut trial);
            let embedded = if trial.starts_with(&PNG_SIGNATURE) {
                EmbeddedKind::Png
            } else if trial.starts_with(&JPEG_SIGNATURE) {
                EmbeddedKind::Jpeg
            } else {
                continue;
            };
            let Ok(inner) = embedded.read_metadata(&trial) else {
                continue;
            };
            tracing::trace!(scheme = scheme.name(), kind = embedded.name(), "mg2 payload decrypted");
            let mut info = ImageMetaData::new(inner.width, inner.height, inner.bpp);
            info.offset_x = inner.offset_x;
            info.offset_y = inner.offset_y;
            return Ok(info.with_extra(FormatMeta::Mg2(Mg2Meta {
                image_length: length,
                alpha_length,
                scheme,
                embedded,
            })));
        }
        Err(GarcError::DetectionMiss)
    }

    fn read(&self, view: &ArcView, info: &ImageMetaData) -> Result<DecodedImage> {
        let FormatMeta::Mg2(meta) = &info.extra else {
            return Err(GarcError::malformed_data("metadata does not describe an MG2 image"));
        };
        let start = HEADER_SIZE as u64;
        let data = decrypt(view, start, meta.image_length, meta.scheme, meta.image_length)?;
        let alpha = match meta.alpha_length {
            0 => None,
            n => Some(decrypt(view, start + meta.image_length as u64, n, meta.scheme, meta.image_length)?),
        };
        Ok(DecodedImage::Embedded(EmbeddedImage {
            kind: meta.embedded,
            info: info.clone(),
            data,
            alpha,
            flip_vertical: meta.scheme.flips_vertically(),
        }))
    }
}

fn decrypt(view: &ArcView, offset: u64, length: u32, scheme: Mg2Scheme, key: u32) -> Result<Vec<u8>> {
    let raw = view.bytes_at(offset, length as usize)?;
    let mut out = Vec::with_capacity(raw.len());
    Mg2Reader::new(raw.as_slice(), scheme.cipher(length, key)).read_to_end(&mut out)?;
    Ok(out)
}
