//! Change-set compositing against a base image from the same archive.

use crate::error::{GarcError, Result};

/// Deepest chain of base references followed before giving up.
pub const MAX_BASE_DEPTH: usize = 16;

/// Tracks the chain of entries being decoded through base references.
#[derive(Debug, Default, Clone)]
pub struct DecodeGuard {
    chain: Vec<usize>,
}

impl DecodeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub fn enter(&mut self, index: usize) -> Result<()> {
        if self.chain.contains(&index) {
            return Err(GarcError::malformed_data(format!(
                "base image chain loops back to entry {index}"
            )));
        }
        if self.chain.len() >= MAX_BASE_DEPTH {
            return Err(GarcError::malformed_data(format!(
                "base image chain deeper than {MAX_BASE_DEPTH}"
            )));
        }
        self.chain.push(index);
        Ok(())
    }

    pub fn leave(&mut self) {
        self.chain.pop();
    }

    /// Run `f` with `index` on the chain.
    pub fn nested<T>(&mut self, index: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.enter(index)?;
        let res = f(self);
        self.leave();
        res
    }
}

/// Overlay a change-set on a BGRA canvas.
///
/// `mask` holds one bit per pixel, LSB first, row-major. Each set bit takes
/// the next three bytes of `bgr` and, when given, the next byte of `alpha`.
/// With `force_opaque` every pixel ends with alpha 0xFF.
pub fn composite(
    canvas: &mut [u8],
    mask: &[u8],
    bgr: &[u8],
    alpha: Option<&[u8]>,
    force_opaque: bool,
) -> Result<()> {
    let short = |what: &str| GarcError::malformed_data(format!("delta {what} buffer too short"));
    let mut color = bgr.chunks_exact(3);
    let mut alpha = alpha.map(|a| a.iter());
    for (i, px) in canvas.chunks_exact_mut(4).enumerate() {
        let bits = *mask.get(i / 8).ok_or_else(|| short("mask"))?;
        if (bits >> (i % 8)) & 1 == 1 {
            let c = color.next().ok_or_else(|| short("colour"))?;
            px[..3].copy_from_slice(c);
            if let Some(a) = alpha.as_mut() {
                px[3] = *a.next().ok_or_else(|| short("alpha"))?;
            }
        }
        if force_opaque {
            px[3] = 0xFF;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bits_take_delta_pixels() {
        let mut canvas = vec![5u8; 4 * 4 * 4];
        let mut mask = [0u8; 2];
        // pixel (x=2, y=3) -> index 14
        mask[1] = 1 << 6;
        composite(&mut canvas, &mask, &[10, 20, 30], None, true).unwrap();
        for (i, px) in canvas.chunks_exact(4).enumerate() {
            if i == 14 {
                assert_eq!(px, [10, 20, 30, 255]);
            } else {
                assert_eq!(px, [5, 5, 5, 255]);
            }
        }
    }

    #[test]
    fn alpha_deltas_follow_the_mask() {
        let mut canvas = vec![0u8; 3 * 4];
        composite(&mut canvas, &[0b101], &[1, 2, 3, 4, 5, 6], Some(&[0x80, 0x40][..]), false).unwrap();
        assert_eq!(canvas, [1, 2, 3, 0x80, 0, 0, 0, 0, 4, 5, 6, 0x40]);
    }

    #[test]
    fn short_buffers_are_malformed() {
        let mut canvas = vec![0u8; 16 * 4];
        assert!(composite(&mut canvas, &[0xFF], &[0; 24], None, false).is_err());
        assert!(composite(&mut canvas, &[0xFF, 0xFF], &[0; 6], None, false).is_err());
    }

    #[test]
    fn guard_stops_cycles_and_depth() {
        let mut guard = DecodeGuard::new();
        guard.enter(3).unwrap();
        assert!(guard.enter(3).is_err());
        guard.leave();
        let err = (0..=MAX_BASE_DEPTH).try_for_each(|i| guard.enter(i));
        assert!(err.is_err());
        assert_eq!(guard.depth(), MAX_BASE_DEPTH);
    }
}
