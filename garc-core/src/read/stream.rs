use super::view::ArcView;
use crate::error::Result;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

/// Seekable window `[start, start + len)` over a shared view.
pub struct RegionReader {
    view: Arc<ArcView>,
    start: u64,
    len: u64,
    pos: u64,
}

impl RegionReader {
    pub(crate) fn new(view: Arc<ArcView>, start: u64, len: u64) -> Self {
        Self {
            view,
            start,
            len,
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for RegionReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        let cap = std::cmp::min(self.len - self.pos, buf.len() as u64) as usize;
        let n = self.view.read_at(self.start + self.pos, &mut buf[..cap])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RegionReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of region",
            )),
        }
    }
}

/// Caps the number of bytes handed out by the inner reader.
pub struct LimitReader<R: Read> {
    inner: R,
    remain: u64,
}

impl<R: Read> LimitReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remain: limit,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for LimitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remain == 0 {
            return Ok(0);
        }
        let cap = std::cmp::min(self.remain, buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..cap])?;
        self.remain -= n as u64;
        Ok(n)
    }
}

type DecodeFn = Box<dyn FnOnce() -> Result<Vec<u8>> + Send>;

/// Defers a whole-buffer decode until the first read asks for bytes.
///
/// Used for codecs that write planes at a stride and so cannot emit output
/// incrementally.
pub struct DecodeOnRead {
    pending: Option<DecodeFn>,
    cur: Cursor<Vec<u8>>,
}

impl DecodeOnRead {
    pub fn new(decode: impl FnOnce() -> Result<Vec<u8>> + Send + 'static) -> Self {
        Self {
            pending: Some(Box::new(decode)),
            cur: Cursor::new(Vec::new()),
        }
    }

    fn load(&mut self) -> std::io::Result<()> {
        if let Some(decode) = self.pending.take() {
            self.cur = Cursor::new(decode()?);
        }
        Ok(())
    }
}

impl Read for DecodeOnRead {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.load()?;
        self.cur.read(buf)
    }
}

impl Seek for DecodeOnRead {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.load()?;
        self.cur.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn region_is_bounded_and_seekable() {
        let view = Arc::new(ArcView::from_bytes("r.bin", (0u8..100).collect()));
        let mut r = view.region(10, 5).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![10, 11, 12, 13, 14]);

        r.seek(SeekFrom::End(-2)).unwrap();
        let mut two = [0u8; 4];
        assert_eq!(r.read(&mut two).unwrap(), 2);
        assert_eq!(&two[..2], &[13, 14]);
        assert!(r.seek(SeekFrom::Current(-10)).is_err());
        assert!(view.region(98, 5).is_err());
    }

    #[test]
    fn limit_stops_early() {
        let mut r = LimitReader::new(&b"abcdef"[..], 3);
        let mut out = String::new();
        r.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn decode_runs_only_when_read() {
        static RAN: AtomicBool = AtomicBool::new(false);
        let mut r = DecodeOnRead::new(|| {
            RAN.store(true, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        });
        assert!(!RAN.load(Ordering::SeqCst));
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert!(RAN.load(Ordering::SeqCst));
        assert_eq!(out, vec![1, 2, 3]);
    }
}
