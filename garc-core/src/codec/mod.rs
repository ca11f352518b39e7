use crate::error::{GarcError, Result};
use crate::read::stream::{DecodeOnRead, LimitReader};
use std::io::Read;

pub mod huffman;
pub mod lzss;
pub mod nsa_lzss;
pub mod planar_lz;
pub mod rle;

/// Payload compression attached to an archive entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    /// 4 KiB window byte-oriented LZSS.
    Lzss,
    /// `u32` unpacked length followed by a preorder-tree Huffman stream.
    Huffman,
    Zlib,
    /// NScripter bit-packed LZSS.
    NsaLzss,
    /// NScripter SPB picture packing.
    Spb,
    /// NScripter bzip2 wrapper.
    Nbz,
    Unknown(u8),
}

impl Compression {
    /// NScripter index compression byte.
    pub fn from_nsa(code: u8) -> Self {
        match code {
            0 => Compression::None,
            1 => Compression::Spb,
            2 => Compression::NsaLzss,
            4 => Compression::Nbz,
            8 => Compression::Zlib,
            x => Compression::Unknown(x),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lzss => "lzss",
            Compression::Huffman => "huffman",
            Compression::Zlib => "zlib",
            Compression::NsaLzss => "nsa-lzss",
            Compression::Spb => "spb",
            Compression::Nbz => "nbz",
            Compression::Unknown(_) => "unknown",
        }
    }
}

/// Wrap `src` in the decompressing reader for `kind`.
///
/// `unpacked` bounds the output where the format records it.
pub fn open_reader(
    kind: Compression,
    mut src: Box<dyn Read + Send>,
    unpacked: Option<u64>,
) -> Result<Box<dyn Read + Send>> {
    let limited = |r: Box<dyn Read + Send>| -> Box<dyn Read + Send> {
        match unpacked {
            Some(n) => Box::new(LimitReader::new(r, n)),
            None => r,
        }
    };
    match kind {
        Compression::None => Ok(src),
        Compression::Lzss => Ok(limited(Box::new(lzss::LzssReader::new(src)))),
        Compression::Huffman => {
            let mut len = [0u8; 4];
            src.read_exact(&mut len)?;
            let len = u32::from_le_bytes(len) as u64;
            Ok(Box::new(LimitReader::new(huffman::HuffmanReader::new(src), len)))
        }
        Compression::Zlib => Ok(limited(Box::new(flate2::read::ZlibDecoder::new(src)))),
        Compression::NsaLzss => {
            let size = unpacked.ok_or_else(|| {
                GarcError::malformed_index("nscripter lzss entry without unpacked size")
            })?;
            Ok(Box::new(DecodeOnRead::new(move || {
                let mut packed = Vec::new();
                src.read_to_end(&mut packed)?;
                nsa_lzss::decode(&packed, size as usize)
            })))
        }
        other => Err(GarcError::unsupported(format!(
            "{} entry compression",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn zlib_entries_stream_through_flate2() {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"zlib payload zlib payload").unwrap();
        let packed = enc.finish().unwrap();

        let mut r = open_reader(Compression::Zlib, Box::new(std::io::Cursor::new(packed)), Some(25)).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"zlib payload zlib payload");
    }

    #[test]
    fn unimplemented_kinds_are_explicit() {
        let src: Box<dyn Read + Send> = Box::new(std::io::empty());
        let err = open_reader(Compression::Nbz, src, None).err().unwrap();
        assert!(matches!(err, GarcError::UnsupportedVariant(_)));
    }

    #[test]
    fn huffman_reader_uses_recorded_length() {
        let packed = huffman::encode(b"abracadabra");
        let mut r = open_reader(Compression::Huffman, Box::new(std::io::Cursor::new(packed)), None).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abracadabra");
    }
}
