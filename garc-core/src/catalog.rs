use crate::container::meta::ImageMetaData;
use crate::error::Result;
use crate::formats::{self, ARCHIVE_FORMATS, ArchiveFormat, IMAGE_FORMATS, ImageFormat};
use crate::image::data::DecodedImage;
use crate::read::opened::ArcFile;
use crate::read::view::ArcView;
use crate::scheme::SchemeCatalog;
use std::path::Path;
use std::sync::Arc;

/// A standalone image recognized by one of the image decoders.
pub struct ImageFile {
    pub view: Arc<ArcView>,
    pub format: &'static dyn ImageFormat,
    pub info: ImageMetaData,
}

impl ImageFile {
    pub fn decode(&self) -> Result<DecodedImage> {
        self.format.read(&self.view, &self.info)
    }
}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFile")
            .field("view", &self.view)
            .field("format", &self.format.tag())
            .field("info", &self.info)
            .finish()
    }
}

#[derive(Debug)]
pub enum Detected {
    Archive(ArcFile),
    Image(ImageFile),
}

/// Trial-and-rollback detection over the static decoder tables.
#[derive(Debug, Default)]
pub struct FormatCatalog {
    schemes: SchemeCatalog,
}

impl FormatCatalog {
    pub fn new(schemes: SchemeCatalog) -> Self {
        Self { schemes }
    }

    pub fn schemes(&self) -> &SchemeCatalog {
        &self.schemes
    }

    pub fn schemes_mut(&mut self) -> &mut SchemeCatalog {
        &mut self.schemes
    }

    pub fn archive_formats(&self) -> &'static [&'static dyn ArchiveFormat] {
        ARCHIVE_FORMATS
    }

    pub fn image_formats(&self) -> &'static [&'static dyn ImageFormat] {
        IMAGE_FORMATS
    }

    pub fn find_archive_format(&self, tag: &str) -> Option<&'static dyn ArchiveFormat> {
        formats::find_archive_format(tag)
    }

    pub fn find_image_format(&self, tag: &str) -> Option<&'static dyn ImageFormat> {
        formats::find_image_format(tag)
    }

    /// Ask every decoder in registration order; the first that accepts wins.
    /// Probe failures of any kind only move on to the next decoder.
    pub fn probe(&self, view: Arc<ArcView>) -> Result<Option<Detected>> {
        for &format in ARCHIVE_FORMATS {
            match format.try_open(&view, &self.schemes) {
                Ok(entries) => {
                    tracing::debug!(format = format.tag(), entries = entries.len(), "archive recognized");
                    return Ok(Some(Detected::Archive(ArcFile::new(view, format, entries))));
                }
                Err(e) => tracing::debug!(format = format.tag(), error = %e, "archive probe missed"),
            }
        }
        for &format in IMAGE_FORMATS {
            match format.read_metadata(&view) {
                Ok(info) => {
                    tracing::debug!(format = format.tag(), width = info.width, height = info.height, "image recognized");
                    return Ok(Some(Detected::Image(ImageFile { view, format, info })));
                }
                Err(e) => tracing::debug!(format = format.tag(), error = %e, "image probe missed"),
            }
        }
        Ok(None)
    }

    pub fn open_path(&self, path: &Path) -> Result<Option<Detected>> {
        let view = Arc::new(ArcView::open(path)?);
        self.probe(view)
    }

    /// Open `path` as an archive, ignoring image decoders.
    pub fn open_archive(&self, path: &Path) -> Result<Option<ArcFile>> {
        Ok(match self.open_path(path)? {
            Some(Detected::Archive(arc)) => Some(arc),
            _ => None,
        })
    }
}
