//! Signed-count run-length planes (BSG compression mode 1).

use crate::error::{GarcError, Result};
use crate::util::bytes::{next_i32, next_u8};
use std::io::Read;

/// Unpack one plane into `out`, writing every `stride`-th byte from `start`.
///
/// Stream: `i32` byte budget, then groups led by a signed count. A count
/// `n >= 0` is followed by `n + 1` literals; a negative count repeats the
/// next byte `1 - n` times.
pub fn unpack_plane(input: &mut impl Read, out: &mut [u8], start: usize, stride: usize) -> Result<()> {
    let mut dst = start;
    let mut put = |dst: &mut usize, b: u8| -> Result<()> {
        let slot = out
            .get_mut(*dst)
            .ok_or_else(|| GarcError::malformed_data("rle run past end of plane"))?;
        *slot = b;
        *dst += stride;
        Ok(())
    };

    let mut remaining = next_i32(input)?;
    while remaining > 0 {
        let count = next_u8(input)? as i8 as i32;
        remaining -= 1;
        if count >= 0 {
            for _ in 0..=count {
                let b = next_u8(input)?;
                remaining -= 1;
                put(&mut dst, b)?;
            }
        } else {
            let b = next_u8(input)?;
            remaining -= 1;
            for _ in 0..(1 - count) {
                put(&mut dst, b)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_and_runs_land_on_stride() {
        // budget 5: literal group (1 + 2 bytes), run group of 3 (1 + 1 bytes)
        let stream = [5, 0, 0, 0, 0x01, 0xAA, 0xBB, 0xFE, 0xCC];
        let mut out = vec![0u8; 10];
        unpack_plane(&mut &stream[..], &mut out, 1, 2).unwrap();
        assert_eq!(out, [0, 0xAA, 0, 0xBB, 0, 0xCC, 0, 0xCC, 0, 0xCC]);
    }

    #[test]
    fn overrun_is_rejected() {
        let stream = [2, 0, 0, 0, 0x80, 0x11];
        let mut out = vec![0u8; 8];
        let err = unpack_plane(&mut &stream[..], &mut out, 0, 1).unwrap_err();
        assert!(matches!(err, GarcError::MalformedData(_)));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let stream = [9, 0, 0, 0, 0x05, 0x01];
        let mut out = vec![0u8; 16];
        assert!(unpack_plane(&mut &stream[..], &mut out, 0, 1).is_err());
    }
}
