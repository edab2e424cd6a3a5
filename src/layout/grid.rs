use crate::foundation::core::Size;

/// Cell geometry of a tile grid.
///
/// All cells have the same size; cell `(row, col)` holds tile `row * cols + col`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GridLayout {
    /// Tile width in pixels.
    pub tile_w: u32,
    /// Tile height in pixels.
    pub tile_h: u32,
    /// Row count.
    pub rows: u32,
    /// Column count.
    pub cols: u32,
    /// Horizontal gap between columns.
    pub gap_h: u32,
    /// Vertical gap between rows.
    pub gap_v: u32,
    /// Grid frame width including gaps.
    pub frame_w: u32,
    /// Grid frame height including gaps.
    pub frame_h: u32,
}

/// Compute the grid for uniform `tile_w` x `tile_h` cells.
pub fn layout(
    tile_w: u32,
    tile_h: u32,
    rows: u32,
    cols: u32,
    gap_h: u32,
    gap_v: u32,
) -> GridLayout {
    let span = |n: u32, cell: u32, gap: u32| -> u32 {
        cell.saturating_mul(n)
            .saturating_add(gap.saturating_mul(n.saturating_sub(1)))
    };
    GridLayout {
        tile_w,
        tile_h,
        rows,
        cols,
        gap_h,
        gap_v,
        frame_w: span(cols, tile_w, gap_h),
        frame_h: span(rows, tile_h, gap_v),
    }
}

impl GridLayout {
    /// Number of cells.
    pub fn capacity(&self) -> usize {
        (self.rows as usize) * (self.cols as usize)
    }

    /// Grid frame size.
    pub fn frame_size(&self) -> Size {
        Size::new(self.frame_w, self.frame_h)
    }

    /// `(row, col)` of tile `idx`, or `None` past the last cell.
    pub fn cell_of(&self, idx: usize) -> Option<(u32, u32)> {
        if self.cols == 0 || idx >= self.capacity() {
            return None;
        }
        let cols = self.cols as usize;
        Some(((idx / cols) as u32, (idx % cols) as u32))
    }

    /// Pixel offset of cell `(row, col)` inside the grid frame.
    ///
    /// Saturates like [`layout`], so a cell that cannot be addressed lands past the frame edge.
    pub fn cell_offset(&self, row: u32, col: u32) -> (u32, u32) {
        (
            col.saturating_mul(self.tile_w.saturating_add(self.gap_h)),
            row.saturating_mul(self.tile_h.saturating_add(self.gap_v)),
        )
    }

    /// Offsets of the first `count` cells in row-major order (capped at capacity).
    pub fn cells(&self, count: usize) -> Vec<(u32, u32)> {
        (0..count.min(self.capacity()))
            .filter_map(|idx| self.cell_of(idx))
            .map(|(row, col)| self.cell_offset(row, col))
            .collect()
    }
}
