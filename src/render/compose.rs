use crate::animation::AnimationTimeline;
use crate::assets::Tile;
use crate::config::PipelineConfig;
use crate::foundation::core::{FrameIndex, Size};
use crate::foundation::error::{TileslideError, TileslideResult};
use crate::layout::GridLayout;

use super::frame::RenderFrame;

/// Composes the background and the sliding tile grid into frames.
///
/// Holds no per-frame state: any frame can be rendered from any thread in any order, and the
/// same index always produces the same bytes.
#[derive(Clone, Debug)]
pub struct FrameRenderer {
    size: Size,
    fps: u32,
    layout: GridLayout,
    timeline: AnimationTimeline,
    tiles: Vec<Tile>,
    cells: Vec<(u32, u32)>,
    background_row: Vec<u8>,
}

impl FrameRenderer {
    /// Build a renderer for `tiles` placed row-major into `layout`.
    ///
    /// Tiles beyond the grid capacity are dropped. Every tile must match the layout cell size.
    pub fn new(
        cfg: &PipelineConfig,
        layout: GridLayout,
        mut tiles: Vec<Tile>,
    ) -> TileslideResult<Self> {
        if let Some(bad) = tiles
            .iter()
            .find(|t| (t.width, t.height) != (layout.tile_w, layout.tile_h))
        {
            return Err(TileslideError::validation(format!(
                "tile is {}x{}, grid cells are {}x{}",
                bad.width, bad.height, layout.tile_w, layout.tile_h
            )));
        }
        tiles.truncate(layout.capacity());

        let size = cfg.final_size(layout.frame_size());
        let timeline = AnimationTimeline::new(
            cfg.duration_secs,
            cfg.slide_speed,
            size,
            layout.frame_size(),
        );
        let cells = layout.cells(tiles.len());
        let rgb = cfg.background.to_array();
        let background_row = rgb
            .iter()
            .copied()
            .cycle()
            .take((size.width as usize) * 3)
            .collect();

        Ok(Self {
            size,
            fps: cfg.fps,
            layout,
            timeline,
            tiles,
            cells,
            background_row,
        })
    }

    /// Final frame size.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Grid geometry in use.
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Tiles that will be drawn.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Grid position for `index` (frame time is `index / fps` seconds).
    pub fn grid_offset(&self, index: FrameIndex) -> (i64, i64) {
        self.timeline.offset(index.time_secs(self.fps))
    }

    /// Render one frame.
    pub fn render(&self, index: FrameIndex) -> RenderFrame {
        let (gx, gy) = self.grid_offset(index);
        let mut data = Vec::with_capacity(self.size.rgb_len());
        for _ in 0..self.size.height {
            data.extend_from_slice(&self.background_row);
        }

        for (tile, &(cx, cy)) in self.tiles.iter().zip(&self.cells) {
            blit(
                &mut data,
                self.size,
                tile,
                gx + i64::from(cx),
                gy + i64::from(cy),
            );
        }

        RenderFrame {
            index,
            size: self.size,
            data,
        }
    }
}

/// Copy `tile` into `dst` with its top-left at `(x0, y0)`, clipped to the frame.
fn blit(dst: &mut [u8], size: Size, tile: &Tile, x0: i64, y0: i64) {
    let (fw, fh) = (i64::from(size.width), i64::from(size.height));
    let (tw, th) = (i64::from(tile.width), i64::from(tile.height));

    let (xs, xe) = (x0.max(0), (x0 + tw).min(fw));
    let (ys, ye) = (y0.max(0), (y0 + th).min(fh));
    if xs >= xe || ys >= ye {
        return;
    }

    let src = tile.pixels.as_raw();
    let src_stride = (tw as usize) * 3;
    let dst_stride = (fw as usize) * 3;
    let run = ((xe - xs) as usize) * 3;
    let src_col = ((xs - x0) as usize) * 3;

    for y in ys..ye {
        let s = ((y - y0) as usize) * src_stride + src_col;
        let d = (y as usize) * dst_stride + (xs as usize) * 3;
        dst[d..d + run].copy_from_slice(&src[s..s + run]);
    }
}

/// One-shot render of `index` for `tiles` in `layout` under `cfg`.
pub fn render_frame(
    index: FrameIndex,
    cfg: &PipelineConfig,
    layout: GridLayout,
    tiles: &[Tile],
) -> TileslideResult<RenderFrame> {
    Ok(FrameRenderer::new(cfg, layout, tiles.to_vec())?.render(index))
}
