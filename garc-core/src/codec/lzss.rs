//! Classic 4 KiB window LZSS.
//!
//! Control bytes are consumed LSB first; a set bit is a literal, a clear bit
//! a two-byte reference `lo, hi` with window offset `lo | (hi & 0xF0) << 4`
//! and length `(hi & 0x0F) + 3`. The window starts zero-filled with the
//! write cursor at `0xFEE`.

use std::io::Read;

const FRAME_SIZE: usize = 0x1000;
const FRAME_MASK: usize = FRAME_SIZE - 1;
const FRAME_INIT_POS: usize = 0xFEE;

pub struct LzssReader<R: Read> {
    inner: R,
    frame: Box<[u8; FRAME_SIZE]>,
    frame_pos: usize,
    ctl: u32,
    copy_from: usize,
    copy_left: usize,
    eof: bool,
}

impl<R: Read> LzssReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            frame: Box::new([0u8; FRAME_SIZE]),
            frame_pos: FRAME_INIT_POS,
            ctl: 0,
            copy_from: 0,
            copy_left: 0,
            eof: false,
        }
    }

    fn next_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.inner.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(b[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn emit(&mut self, b: u8) -> u8 {
        self.frame[self.frame_pos] = b;
        self.frame_pos = (self.frame_pos + 1) & FRAME_MASK;
        b
    }
}

impl<R: Read> Read for LzssReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            if self.copy_left > 0 {
                let b = self.frame[self.copy_from];
                self.copy_from = (self.copy_from + 1) & FRAME_MASK;
                self.copy_left -= 1;
                buf[n] = self.emit(b);
                n += 1;
                continue;
            }
            if self.eof {
                break;
            }
            self.ctl >>= 1;
            if self.ctl & 0x100 == 0 {
                match self.next_byte()? {
                    Some(c) => self.ctl = c as u32 | 0xFF00,
                    None => {
                        self.eof = true;
                        break;
                    }
                }
            }
            if self.ctl & 1 != 0 {
                match self.next_byte()? {
                    Some(b) => {
                        buf[n] = self.emit(b);
                        n += 1;
                    }
                    None => self.eof = true,
                }
            } else {
                let (Some(lo), Some(hi)) = (self.next_byte()?, self.next_byte()?) else {
                    self.eof = true;
                    continue;
                };
                self.copy_from = lo as usize | ((hi as usize & 0xF0) << 4);
                self.copy_left = (hi as usize & 0x0F) + 3;
            }
        }
        Ok(n)
    }
}
