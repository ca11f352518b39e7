#![forbid(unsafe_code)]

pub mod error;

pub mod util {
    pub mod bytes;
}

pub mod codec;

pub mod crypto {
    pub mod keystream;
    pub mod mg2;
    pub mod valkyria;
}

pub mod container {
    pub mod entry;
    pub mod meta;
}

pub mod read {
    pub mod extract;
    pub mod opened;
    pub mod stream;
    pub mod view;
}

pub mod image {
    pub mod data;
    pub mod delta;
    pub mod embedded;
    pub mod tiles;
}

pub mod formats;

pub mod catalog;
pub mod scheme;

// Re-exports: stable API surface
pub use catalog::{Detected, FormatCatalog, ImageFile};
pub use container::entry::{Entry, EntryKind};
pub use container::meta::ImageMetaData;
pub use error::{GarcError, Result};
pub use image::data::{DecodedImage, ImageData, PixelFormat};
pub use read::extract::{ArchiveOperation, extract_all, extract_entry};
pub use read::opened::ArcFile;
pub use read::view::ArcView;
pub use scheme::SchemeCatalog;
