/// Additive byte keystream seeded from a 32-bit value.
///
/// With seed bytes `b0..b3` (little endian) the stream starts at `b1 + b3`
/// and advances by `b0 + b2` per byte, all modulo 256.
#[derive(Clone, Debug)]
pub struct Keystream {
    value: u8,
    step: u8,
}

impl Keystream {
    pub fn new(seed: u32) -> Self {
        let b = seed.to_le_bytes();
        Self {
            value: b[1].wrapping_add(b[3]),
            step: b[0].wrapping_add(b[2]),
        }
    }
}

impl Iterator for Keystream {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let v = self.value;
        self.value = self.value.wrapping_add(self.step);
        Some(v)
    }
}

/// XOR `buf` with the keystream for `seed`, from its first byte.
pub fn deobfuscate(buf: &mut [u8], seed: u32) {
    for (b, k) in buf.iter_mut().zip(Keystream::new(seed)) {
        *b ^= k;
    }
}
