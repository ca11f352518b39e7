use thiserror::Error;

#[derive(Error, Debug)]
pub enum GarcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The probed source is not in the format the decoder handles.
    #[error("format not recognized")]
    DetectionMiss,

    /// A structural invariant of an archive index was violated mid-parse.
    #[error("malformed index: {0}")]
    MalformedIndex(String),

    /// Entry payload is inconsistent with its own headers.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// Recognized sub-mode that has no decoder.
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),

    #[error("computed size exceeds addressable range")]
    SizeOverflow,

    /// Zero-sized entry; some titles ship these on purpose.
    #[error("entry {0} is empty")]
    EmptyEntry(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("scheme catalog error: {0}")]
    Catalog(String),
}

impl GarcError {
    pub fn malformed_index(msg: impl Into<String>) -> Self {
        GarcError::MalformedIndex(msg.into())
    }

    pub fn malformed_data(msg: impl Into<String>) -> Self {
        GarcError::MalformedData(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        GarcError::UnsupportedVariant(msg.into())
    }
}

impl From<GarcError> for std::io::Error {
    fn from(e: GarcError) -> Self {
        match e {
            GarcError::Io(inner) => inner,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, GarcError>;
