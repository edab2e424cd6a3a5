use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

use crate::config::FrameFormat;
use crate::foundation::core::Size;
use crate::foundation::error::{TileslideError, TileslideResult};

/// Decode a still image from disk into tightly packed RGB8.
///
/// Any alpha channel is dropped. Failures are reported as preprocess errors for `path`.
pub fn decode_image(path: &Path) -> TileslideResult<RgbImage> {
    if !path.is_file() {
        return Err(TileslideError::preprocess(path, "file not found"));
    }
    let dyn_img = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| TileslideError::preprocess(path, format!("open failed: {e}")))?
        .decode()
        .map_err(|e| TileslideError::preprocess(path, format!("decode failed: {e}")))?;
    Ok(dyn_img.to_rgb8())
}

/// Encode a packed RGB24 buffer of `size` to `path`.
///
/// `quality` applies to JPEG only (1..=100).
pub fn encode_image(
    rgb: &[u8],
    size: Size,
    path: &Path,
    format: FrameFormat,
    quality: u8,
) -> TileslideResult<()> {
    if rgb.len() != size.rgb_len() {
        return Err(TileslideError::validation(format!(
            "encode_image buffer is {} bytes, expected {} for {}x{}",
            rgb.len(),
            size.rgb_len(),
            size.width,
            size.height
        )));
    }

    match format {
        FrameFormat::Jpeg => {
            let file = File::create(path)
                .with_context(|| format!("create image file '{}'", path.display()))?;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                BufWriter::new(file),
                quality.clamp(1, 100),
            );
            encoder
                .write_image(rgb, size.width, size.height, ExtendedColorType::Rgb8)
                .with_context(|| format!("encode jpeg '{}'", path.display()))?;
        }
        FrameFormat::Png => {
            image::save_buffer_with_format(
                path,
                rgb,
                size.width,
                size.height,
                ExtendedColorType::Rgb8,
                image::ImageFormat::Png,
            )
            .with_context(|| format!("encode png '{}'", path.display()))?;
        }
    }
    Ok(())
}
