//! Bounds-checked little/big endian field access over header slices.

use crate::error::{GarcError, Result};
use encoding_rs::SHIFT_JIS;
use std::io::Read;

#[inline]
fn field<const N: usize>(b: &[u8], at: usize) -> Result<[u8; N]> {
    b.get(at..at.saturating_add(N))
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| GarcError::malformed_data(format!("field at 0x{at:X} past end of buffer")))
}

pub fn u8_at(b: &[u8], at: usize) -> Result<u8> {
    Ok(field::<1>(b, at)?[0])
}

pub fn u16_le(b: &[u8], at: usize) -> Result<u16> {
    Ok(u16::from_le_bytes(field(b, at)?))
}

pub fn i16_le(b: &[u8], at: usize) -> Result<i16> {
    Ok(i16::from_le_bytes(field(b, at)?))
}

pub fn u32_le(b: &[u8], at: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(field(b, at)?))
}

pub fn i32_le(b: &[u8], at: usize) -> Result<i32> {
    Ok(i32::from_le_bytes(field(b, at)?))
}

pub fn u64_le(b: &[u8], at: usize) -> Result<u64> {
    Ok(u64::from_le_bytes(field(b, at)?))
}

pub fn u32_be(b: &[u8], at: usize) -> Result<u32> {
    Ok(u32::from_be_bytes(field(b, at)?))
}

pub fn i16_be(b: &[u8], at: usize) -> Result<i16> {
    Ok(i16::from_be_bytes(field(b, at)?))
}

/// Bytes up to (not including) the first NUL.
pub fn c_str(b: &[u8]) -> &[u8] {
    match b.iter().position(|&c| c == 0) {
        Some(n) => &b[..n],
        None => b,
    }
}

/// Decode a NUL-terminated CP932 name field.
pub fn cp932_name(b: &[u8]) -> String {
    let (s, _, _) = SHIFT_JIS.decode(c_str(b));
    s.into_owned()
}

pub fn ascii_eq(b: &[u8], at: usize, expected: &[u8]) -> bool {
    b.get(at..at.saturating_add(expected.len())) == Some(expected)
}

/// Next byte of a codec input stream; running dry is a data error.
pub fn next_u8(r: &mut impl Read) -> Result<u8> {
    let mut b = [0u8; 1];
    read_field(r, &mut b)?;
    Ok(b[0])
}

pub fn next_i32(r: &mut impl Read) -> Result<i32> {
    let mut b = [0u8; 4];
    read_field(r, &mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn read_field(r: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => GarcError::malformed_data("compressed stream truncated"),
        _ => GarcError::Io(e),
    })
}
