use crate::container::entry::Entry;
use crate::error::{GarcError, Result};
use crate::formats::ArchiveFormat;
use crate::image::data::DecodedImage;
use crate::image::delta::DecodeGuard;
use crate::read::view::ArcView;
use std::io::Read;
use std::sync::Arc;

/// A successfully probed archive: its source, the decoder that parsed it and
/// the entry table. Read-only once built.
pub struct ArcFile {
    view: Arc<ArcView>,
    format: &'static dyn ArchiveFormat,
    entries: Vec<Entry>,
}

impl ArcFile {
    pub fn new(view: Arc<ArcView>, format: &'static dyn ArchiveFormat, entries: Vec<Entry>) -> Self {
        Self {
            view,
            format,
            entries,
        }
    }

    pub fn view(&self) -> &Arc<ArcView> {
        &self.view
    }

    pub fn format(&self) -> &'static dyn ArchiveFormat {
        self.format
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Result<&Entry> {
        self.entries
            .get(index)
            .ok_or_else(|| GarcError::NotFound(format!("entry #{index} in {}", self.view.name().display())))
    }

    /// Case-insensitive lookup by name.
    pub fn find(&self, name: &str) -> Option<(usize, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.name.eq_ignore_ascii_case(name))
    }

    /// Stream the decoded bytes of entry `index`.
    pub fn open_entry(&self, index: usize) -> Result<Box<dyn Read + Send>> {
        let entry = self.entry(index)?;
        self.format.open_entry(self, entry)
    }

    pub fn read_entry(&self, index: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.open_entry(index)?.read_to_end(&mut out)?;
        Ok(out)
    }

    pub fn open_image(&self, index: usize) -> Result<DecodedImage> {
        self.open_image_guarded(index, &mut DecodeGuard::new())
    }

    /// Decode an image reached through a chain of base references.
    pub fn open_image_guarded(&self, index: usize, guard: &mut DecodeGuard) -> Result<DecodedImage> {
        guard.nested(index, |guard| self.format.open_image(self, index, guard))
    }
}

impl std::fmt::Debug for ArcFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcFile")
            .field("view", &self.view)
            .field("format", &self.format.tag())
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::moonstone::PakFormat;

    fn arc() -> ArcFile {
        let view = Arc::new(ArcView::from_bytes("mem.pak", b"0123456789".to_vec()));
        let entries = vec![
            Entry::new("First.txt").with_placement(0, 4),
            Entry::new("second.bin").with_placement(4, 6),
        ];
        ArcFile::new(view, &PakFormat, entries)
    }

    #[test]
    fn finds_entries_ignoring_case() {
        let a = arc();
        assert_eq!(a.find("first.TXT").map(|(i, _)| i), Some(0));
        assert!(a.find("third").is_none());
        assert!(matches!(a.entry(5), Err(GarcError::NotFound(_))));
    }

    #[test]
    fn reads_raw_regions() {
        let a = arc();
        assert_eq!(a.read_entry(1).unwrap(), b"456789");
    }
}
