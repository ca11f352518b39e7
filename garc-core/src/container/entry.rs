use crate::codec::Compression;
use crate::error::{GarcError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Image,
    Script,
    Audio,
    Other,
}

impl EntryKind {
    /// Best guess from the file extension.
    pub fn from_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "bmp" | "png" | "jpg" | "jpeg" | "bsg" | "bip" | "mg2" | "abm" | "cmp" | "tga" => {
                EntryKind::Image
            }
            "ogg" | "wav" | "mp3" | "wma" => EntryKind::Audio,
            "scr" | "txt" | "ks" | "nss" => EntryKind::Script,
            _ => EntryKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Image => "image",
            EntryKind::Script => "script",
            EntryKind::Audio => "audio",
            EntryKind::Other => "",
        }
    }
}

/// One file inside a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub kind: EntryKind,
    pub unpacked_size: Option<u64>,
    pub compression: Option<Compression>,
    pub packed: bool,
    pub hash: Option<u32>,
}

impl Entry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = EntryKind::from_name(&name);
        Self {
            name,
            offset: 0,
            size: 0,
            kind,
            unpacked_size: None,
            compression: None,
            packed: false,
            hash: None,
        }
    }

    pub fn with_placement(mut self, offset: u64, size: u64) -> Self {
        self.offset = offset;
        self.size = size;
        self
    }

    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    pub fn check_placement(&self, max_offset: u64) -> bool {
        self.end().is_some_and(|end| end <= max_offset)
    }

    /// Fails the surrounding probe when the entry does not fit the source.
    pub fn ensure_placement(&self, max_offset: u64) -> Result<()> {
        if self.check_placement(max_offset) {
            Ok(())
        } else {
            Err(GarcError::malformed_index(format!(
                "{}: 0x{:X}+{} beyond 0x{:X}",
                self.name, self.offset, self.size, max_offset
            )))
        }
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.name
            .rsplit_once('.')
            .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext))
    }
}
