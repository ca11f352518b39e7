use crate::error::{GarcError, Result};
use crate::read::stream::RegionReader;
use crate::util::bytes;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Shared, positioned-read view over an archive source.
///
/// Every read names its absolute offset, so a decoder that gives up halfway
/// through a probe leaves nothing behind for the next one.
pub struct ArcView {
    name: PathBuf,
    len: u64,
    src: Mutex<Box<dyn ReadSeek>>,
}

impl ArcView {
    pub fn open(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        Self::from_source(path, f)
    }

    pub fn from_source(name: impl Into<PathBuf>, mut src: impl ReadSeek + 'static) -> Result<Self> {
        let len = src.seek(SeekFrom::End(0))?;
        Ok(Self {
            name: name.into(),
            len,
            src: Mutex::new(Box::new(src)),
        })
    }

    pub fn from_bytes(name: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            len: data.len() as u64,
            src: Mutex::new(Box::new(Cursor::new(data))),
        }
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn file_name(&self) -> Option<&str> {
        self.name.file_name().and_then(|n| n.to_str())
    }

    /// Directory used to resolve sibling files.
    pub fn dir(&self) -> &Path {
        self.name.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn sibling(&self, name: &str) -> PathBuf {
        self.dir().join(name)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read up to `buf.len()` bytes at `offset`; short only at end of source.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min((self.len - offset) as usize);
        let mut src = self
            .src
            .lock()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        src.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < want {
            let n = src.read(&mut buf[done..want])?;
            if n == 0 {
                break;
            }
            done += n;
        }
        Ok(done)
    }

    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(offset, buf)?;
        if n != buf.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} bytes at 0x{:X} past end of {}", buf.len(), offset, self.name.display()),
            )
            .into());
        }
        Ok(())
    }

    pub fn bytes_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    pub fn u8_at(&self, offset: u64) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact_at(offset, &mut b)?;
        Ok(b[0])
    }

    pub fn u16_at(&self, offset: u64) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact_at(offset, &mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn i16_at(&self, offset: u64) -> Result<i16> {
        let mut b = [0u8; 2];
        self.read_exact_at(offset, &mut b)?;
        Ok(i16::from_le_bytes(b))
    }

    pub fn u32_at(&self, offset: u64) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact_at(offset, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn i32_at(&self, offset: u64) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_exact_at(offset, &mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    pub fn ascii_eq(&self, offset: u64, expected: &[u8]) -> bool {
        let mut b = vec![0u8; expected.len()];
        matches!(self.read_at(offset, &mut b), Ok(n) if n == b.len() && b == expected)
    }

    /// Fixed-width name field decoded as CP932.
    pub fn name_at(&self, offset: u64, width: usize) -> Result<String> {
        Ok(bytes::cp932_name(&self.bytes_at(offset, width)?))
    }

    /// Bounded view of `[offset, offset + len)`.
    pub fn region(self: &Arc<Self>, offset: u64, len: u64) -> Result<RegionReader> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(RegionReader::new(Arc::clone(self), offset, len)),
            _ => Err(GarcError::malformed_data(format!(
                "region 0x{offset:X}+{len} outside {}",
                self.name.display()
            ))),
        }
    }
}

impl std::fmt::Debug for ArcView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcView")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}
