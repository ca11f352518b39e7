//! Control-byte LZ over delta-coded planes (BSG compression mode 2).
//!
//! Stream: control byte, `i32` total length (header included), body. A body
//! byte equal to the control byte introduces either a back-reference
//! `(distance, count)` measured in pixels, or (when the next byte is the
//! control byte again) a literal control byte. Distances above the control
//! byte are stored plus one so the pair never begins with the escape.
//! Once the body is consumed every sample is a delta against the previous
//! sample of the same plane.

use crate::error::{GarcError, Result};
use crate::util::bytes::{next_i32, next_u8};
use std::io::Read;

const MIN_MATCH: usize = 4;
const MAX_MATCH: usize = 0xFF;
const MAX_DISTANCE: usize = 0xFE;

/// Unpack one plane into `out` at `plane`, `plane + stride`, ...
pub fn unpack_plane(input: &mut impl Read, out: &mut [u8], plane: usize, stride: usize) -> Result<()> {
    let overrun = || GarcError::malformed_data("lz plane overruns output");
    let mut dst = plane;
    let control = next_u8(input)?;
    let mut remaining = next_i32(input)? - 5;
    while remaining > 0 {
        let c = next_u8(input)?;
        remaining -= 1;
        if c == control {
            let mut offset = next_u8(input)? as usize;
            remaining -= 1;
            if offset != control as usize {
                let count = next_u8(input)?;
                remaining -= 1;
                if offset > control as usize {
                    offset -= 1;
                }
                let back = offset * stride;
                for _ in 0..count {
                    let src = dst.checked_sub(back).ok_or_else(|| {
                        GarcError::malformed_data("lz back-reference before plane start")
                    })?;
                    let b = *out.get(src).ok_or_else(overrun)?;
                    *out.get_mut(dst).ok_or_else(overrun)? = b;
                    dst += stride;
                }
                continue;
            }
        }
        *out.get_mut(dst).ok_or_else(overrun)? = c;
        dst += stride;
    }

    let mut i = plane + stride;
    while i < out.len() {
        out[i] = out[i].wrapping_add(out[i - stride]);
        i += stride;
    }
    Ok(())
}

/// Encode plane samples into a stream accepted by [`unpack_plane`].
pub fn pack_plane(samples: &[u8]) -> Vec<u8> {
    let mut delta = Vec::with_capacity(samples.len());
    let mut prev = 0u8;
    for &s in samples {
        delta.push(s.wrapping_sub(prev));
        prev = s;
    }

    let mut freq = [0usize; 256];
    for &d in &delta {
        freq[d as usize] += 1;
    }
    let control = (0..=255u8).min_by_key(|&b| freq[b as usize]).unwrap_or(0);

    let mut body = Vec::new();
    let mut i = 0;
    while i < delta.len() {
        let (dist, len) = longest_match(&delta, i);
        if len >= MIN_MATCH {
            let code = if dist < control as usize { dist } else { dist + 1 };
            body.extend([control, code as u8, len as u8]);
            i += len;
            continue;
        }
        if delta[i] == control {
            body.extend([control, control]);
        } else {
            body.push(delta[i]);
        }
        i += 1;
    }

    let mut out = vec![control];
    out.extend((body.len() as i32 + 5).to_le_bytes());
    out.extend(body);
    out
}

fn longest_match(data: &[u8], at: usize) -> (usize, usize) {
    let mut best = (0, 0);
    for dist in 1..=MAX_DISTANCE.min(at) {
        let mut len = 0;
        while len < MAX_MATCH && at + len < data.len() && data[at + len] == data[at + len - dist] {
            len += 1;
        }
        if len > best.1 {
            best = (dist, len);
        }
    }
    best
}
