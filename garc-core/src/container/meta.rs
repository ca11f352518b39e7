use crate::crypto::mg2::Mg2Scheme;
use crate::image::embedded::EmbeddedKind;

/// Header-level description of an image, produced by a metadata probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageMetaData {
    pub width: u32,
    pub height: u32,
    pub bpp: u32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub extra: FormatMeta,
}

impl ImageMetaData {
    pub fn new(width: u32, height: u32, bpp: u32) -> Self {
        Self {
            width,
            height,
            bpp,
            offset_x: 0,
            offset_y: 0,
            extra: FormatMeta::None,
        }
    }

    pub fn with_extra(mut self, extra: FormatMeta) -> Self {
        self.extra = extra;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatMeta {
    None,
    Bsg(BsgMeta),
    Bip(BipMeta),
    Cyberworks(CyberworksMeta),
    Mg2(Mg2Meta),
    Embedded(EmbeddedKind),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BsgMeta {
    pub unpacked_size: u32,
    /// 0 = BGRA, 1 = BGR in 32-bit cells, 2 = 8-bit gray or indexed.
    pub color_mode: u8,
    /// 0 = raw, 1 = RLE planes, 2 = control-byte LZ planes.
    pub compression_mode: u8,
    pub data_offset: u64,
    pub data_size: u32,
    pub palette_offset: u64,
    pub has_palette: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BipMeta {
    pub block_size: u32,
    pub sliced: bool,
    pub multi: bool,
    pub data_offset: u64,
    pub palette_offset: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CyberworksMeta {
    /// Leading type byte: 0x61 or 0x64.
    pub image_type: u8,
    pub flag: u8,
    /// Archive index of the image this one is a change-set against.
    pub base_index: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mg2Meta {
    pub image_length: u32,
    pub alpha_length: u32,
    pub scheme: Mg2Scheme,
    pub embedded: EmbeddedKind,
}
