//! NScripter bit-packed LZSS (256-byte ring, 4-bit lengths).

use crate::error::Result;

const RING: usize = 256;
const RING_START: usize = 239;

struct Bits<'a> {
    src: &'a [u8],
    pos: usize,
    bit: u8,
}

impl<'a> Bits<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0, bit: 0 }
    }

    fn take(&mut self, count: u32) -> Option<u32> {
        let mut v = 0u32;
        for _ in 0..count {
            let byte = *self.src.get(self.pos)?;
            v = (v << 1) | ((byte >> (7 - self.bit)) & 1) as u32;
            self.bit += 1;
            if self.bit == 8 {
                self.bit = 0;
                self.pos += 1;
            }
        }
        Some(v)
    }
}

/// Decode up to `unpacked` bytes; a short stream yields a short buffer.
pub fn decode(packed: &[u8], unpacked: usize) -> Result<Vec<u8>> {
    let mut ring = [0u8; RING];
    let mut r = RING_START;
    let mut bits = Bits::new(packed);
    let mut out = Vec::with_capacity(unpacked);
    'outer: while out.len() < unpacked {
        let Some(flag) = bits.take(1) else { break };
        if flag == 1 {
            let Some(c) = bits.take(8) else { break };
            out.push(c as u8);
            ring[r] = c as u8;
            r = (r + 1) & (RING - 1);
        } else {
            let (Some(i), Some(j)) = (bits.take(8), bits.take(4)) else {
                break;
            };
            for k in 0..(j as usize + 2) {
                if out.len() >= unpacked {
                    break 'outer;
                }
                let c = ring[(i as usize + k) & (RING - 1)];
                out.push(c);
                ring[r] = c;
                r = (r + 1) & (RING - 1);
            }
        }
    }
    Ok(out)
}
