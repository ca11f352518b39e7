//! Tile remapping for PS2-era texture dumps.
//!
//! Pixels are stored as a run of `32·dy × dy` tiles. Adjacent tiles overlap
//! by two pixels, so the stored canvas is padded and every source pixel has
//! to be mapped back onto the logical image. Positions that land outside the
//! image are overlap data and get dropped.
//!
//! Equivalent-looking rewrites of the arithmetic below shift pixels at tile
//! seams.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TileLayout {
    /// 8-bit images with 16-pixel blocks: tiles come in pairs stacked to
    /// form a `2·dy` block, trimmed by one pixel on each side.
    Paired,
    /// Blocks of `dy` with a two pixel overlap.
    Sliced,
    /// Plain raster order, `dy` rows per tile.
    Linear,
}

impl TileLayout {
    pub fn select(bpp: u32, block_size: u32, sliced: bool) -> Self {
        match (sliced, bpp, block_size) {
            (true, 8, 16) => TileLayout::Paired,
            (true, _, _) => TileLayout::Sliced,
            (false, _, _) => TileLayout::Linear,
        }
    }
}

/// Walks the stored pixel stream, yielding `(src_index, x, y)` for every
/// source pixel that lands inside the image.
#[derive(Clone, Debug)]
pub struct TileMap {
    layout: TileLayout,
    width: i64,
    height: i64,
    dy: i64,
    dx: i64,
    dwidth: i64,
    tiles: i64,
    t: i64,
    y: i64,
    x: i64,
}

impl TileMap {
    pub fn new(layout: TileLayout, width: u32, height: u32, block_size: u32) -> Self {
        let (w, h) = (width as i64, height as i64);
        let dy = block_size.max(3) as i64;
        let dx = dy * 32;
        let (dwidth, tiles) = match layout {
            TileLayout::Paired => {
                let dytemp = dy * 2;
                let dwidth = ((w + (dytemp - 2) - 1) / (dytemp - 2)) * dytemp;
                let dheight = ((h + (dytemp - 2) - 1) / (dytemp - 2)) * dytemp;
                let focus_h = (dwidth * dheight + dx - 1) / dx;
                let mut focus_t = (focus_h + dy - 1) / dy;
                if focus_t % 2 == 1 {
                    focus_t += 1;
                }
                (dwidth, focus_t)
            }
            TileLayout::Sliced => {
                let dwidth = ((w + (dy - 2) - 1) / (dy - 2)) * dy;
                let dheight = ((h + (dy - 2) - 1) / (dy - 2)) * dy;
                let focus_h = (dwidth * dheight + dx - 1) / dx;
                (dwidth, (focus_h + dy - 1) / dy)
            }
            TileLayout::Linear => {
                let focus_h = (w * h + dx - 1) / dx;
                (w, (focus_h + dy - 1) / dy)
            }
        };
        Self {
            layout,
            width: w,
            height: h,
            dy,
            dx,
            dwidth,
            tiles,
            t: 0,
            y: 0,
            x: 0,
        }
    }

    /// Number of pixels in the stored stream.
    pub fn source_pixels(&self) -> u64 {
        (self.tiles * self.dy * self.dx) as u64
    }

    fn target(&self) -> Option<(i64, i64)> {
        let (t, y, x, dy, dx) = (self.t, self.y, self.x, self.dy, self.dx);
        let dwidth = self.dwidth;
        let (i4x, i3y) = match self.layout {
            TileLayout::Paired => {
                let dytemp = dy * 2;
                let i2x = x + (t >> 1) * dx;
                let i3t = i2x / dwidth;
                let i3x = i2x - i3t * dwidth;
                let i3y = i3t * (dytemp - 2) + y + (t % 2) * dy - 1;
                let i4x = i3x - i3x / dytemp * dytemp + i3x / dytemp * (dytemp - 2) - 1;
                if i3x >= dwidth {
                    return None;
                }
                (i4x, i3y)
            }
            TileLayout::Sliced => {
                let i2x = x + t * dx;
                let i3t = i2x / dwidth;
                let i3x = i2x - i3t * dwidth;
                let i3y = i3t * (dy - 2) + y;
                let i4x = i3x - i3x / dy * dy + i3x / dy * (dy - 2);
                if i3x >= dwidth {
                    return None;
                }
                (i4x, i3y)
            }
            TileLayout::Linear => {
                let i2x = x + t * dx;
                let i3t = i2x / self.width;
                let i3x = i2x - i3t * self.width;
                (i3x, i3t * dy + y)
            }
        };
        if i4x < 0 || i3y < 0 || i4x >= self.width || i3y >= self.height {
            return None;
        }
        Some((i4x, i3y))
    }

    fn advance(&mut self) {
        self.x += 1;
        if self.x == self.dx {
            self.x = 0;
            self.y += 1;
            if self.y == self.dy {
                self.y = 0;
                self.t += 1;
            }
        }
    }
}

impl Iterator for TileMap {
    type Item = (usize, u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.width == 0 {
            return None;
        }
        while self.t < self.tiles {
            let src = (self.t * self.dy + self.y) * self.dx + self.x;
            let target = self.target();
            self.advance();
            if let Some((x, y)) = target {
                return Some((src as usize, x as u32, y as u32));
            }
        }
        None
    }
}

/// Stored RGBA with 7-bit alpha to BGRA.
pub fn rgba_to_bgra(px: &[u8]) -> [u8; 4] {
    let a = if px[3] >= 127 { 0xFF } else { px[3] << 1 };
    [px[2], px[1], px[0], a]
}
