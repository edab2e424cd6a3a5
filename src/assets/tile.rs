use std::path::Path;

use image::RgbImage;

use super::decode::decode_image;
use super::resize::{CpuResizer, ResizeProvider};
use crate::config::{CropAnchor, PipelineConfig};
use crate::foundation::error::{TileslideError, TileslideResult};

/// Crop and scale parameters shared by every tile of a run.
///
/// Plain values only, so a spec can be handed to any worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TileSpec {
    /// Target aspect ratio numerator.
    pub aspect_w: u32,
    /// Target aspect ratio denominator.
    pub aspect_h: u32,
    /// Which part of the source survives the crop.
    pub anchor: CropAnchor,
    /// Output tile height in pixels.
    pub target_height: u32,
}

impl TileSpec {
    /// Tile parameters of `cfg`.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            aspect_w: cfg.aspect_w,
            aspect_h: cfg.aspect_h,
            anchor: cfg.crop_anchor,
            target_height: cfg.tile_height,
        }
    }

    /// Width every tile of this spec is scaled to: `target_height * aspect_w / aspect_h`,
    /// rounded to the nearest pixel.
    pub fn tile_width(&self) -> u32 {
        let h = u64::from(self.target_height);
        let aw = u64::from(self.aspect_w);
        let ah = u64::from(self.aspect_h).max(1);
        let w = (h * aw + ah / 2) / ah;
        u32::try_from(w).unwrap_or(u32::MAX).max(1)
    }
}

/// One cropped and scaled source image.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    /// Pixel data; dimensions equal `width` x `height`.
    pub pixels: RgbImage,
    /// Tile width in pixels.
    pub width: u32,
    /// Tile height in pixels.
    pub height: u32,
}

impl Tile {
    /// Wrap an RGB image as a tile.
    pub fn new(pixels: RgbImage) -> Self {
        let (width, height) = pixels.dimensions();
        Self {
            pixels,
            width,
            height,
        }
    }
}

/// Rectangle kept by the aspect-ratio crop: `(x, y, width, height)`.
///
/// Wider sources lose columns, taller sources lose rows. The anchor only acts on the axis
/// being cropped; `Top`/`Bottom` on a horizontal crop (and `Left`/`Right` on a vertical one)
/// behave like `Center`.
pub fn crop_window(
    src_w: u32,
    src_h: u32,
    aspect_w: u32,
    aspect_h: u32,
    anchor: CropAnchor,
) -> (u32, u32, u32, u32) {
    let (w, h) = (u64::from(src_w), u64::from(src_h));
    let (aw, ah) = (u64::from(aspect_w), u64::from(aspect_h));

    if w * ah > h * aw {
        let crop_w = ((h * aw) / ah).clamp(1, w);
        let excess = w - crop_w;
        let x = match anchor {
            CropAnchor::Left => 0,
            CropAnchor::Right => excess,
            _ => excess / 2,
        };
        (x as u32, 0, crop_w as u32, src_h)
    } else if w * ah < h * aw {
        let crop_h = ((w * ah) / aw).clamp(1, h);
        let excess = h - crop_h;
        let y = match anchor {
            CropAnchor::Top => 0,
            CropAnchor::Bottom => excess,
            _ => excess / 2,
        };
        (0, y as u32, src_w, crop_h as u32)
    } else {
        (0, 0, src_w, src_h)
    }
}

/// Decode, crop and scale one source image into a [`Tile`].
///
/// If `resizer` fails the CPU resizer is used instead.
pub fn preprocess(
    path: &Path,
    spec: &TileSpec,
    resizer: &dyn ResizeProvider,
) -> TileslideResult<Tile> {
    if spec.aspect_w == 0 || spec.aspect_h == 0 {
        return Err(TileslideError::preprocess(
            path,
            format!(
                "aspect ratio must be positive, got {}:{}",
                spec.aspect_w, spec.aspect_h
            ),
        ));
    }
    if spec.target_height == 0 {
        return Err(TileslideError::preprocess(path, "target height must be positive"));
    }

    let src = decode_image(path)?;
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return Err(TileslideError::preprocess(path, "image has no pixels"));
    }

    let (x, y, cw, ch) = crop_window(w, h, spec.aspect_w, spec.aspect_h, spec.anchor);
    let cropped = image::imageops::crop_imm(&src, x, y, cw, ch).to_image();
    drop(src);

    let (tw, th) = (spec.tile_width(), spec.target_height);
    let scaled = match resizer.resize(&cropped, tw, th) {
        Ok(img) => img,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                provider = resizer.name(),
                error = %e,
                "resize failed, retrying on cpu"
            );
            CpuResizer.resize(&cropped, tw, th)?
        }
    };
    Ok(Tile::new(scaled))
}
