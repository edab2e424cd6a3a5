use std::sync::Arc;

use image::RgbImage;
use image::imageops::FilterType;

use crate::foundation::error::{TileslideError, TileslideResult};

/// Scales RGB images to an exact size.
///
/// Implementations must be usable from several workers at once.
pub trait ResizeProvider: Send + Sync {
    /// Short provider name for logs and reports.
    fn name(&self) -> &'static str;

    /// Resize `src` to exactly `width` x `height`.
    fn resize(&self, src: &RgbImage, width: u32, height: u32) -> TileslideResult<RgbImage>;
}

/// Bilinear (triangle filter) resize on the CPU. Always available.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuResizer;

impl ResizeProvider for CpuResizer {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn resize(&self, src: &RgbImage, width: u32, height: u32) -> TileslideResult<RgbImage> {
        if width == 0 || height == 0 {
            return Err(TileslideError::validation(format!(
                "resize target must be non-zero, got {width}x{height}"
            )));
        }
        if src.dimensions() == (width, height) {
            return Ok(src.clone());
        }
        Ok(image::imageops::resize(
            src,
            width,
            height,
            FilterType::Triangle,
        ))
    }
}

/// Pick the resize provider for a run.
///
/// GPU is tried first when requested and compiled in; any failure falls back to [`CpuResizer`].
pub fn negotiate_resizer(want_gpu: bool) -> Arc<dyn ResizeProvider> {
    if want_gpu {
        #[cfg(feature = "gpu")]
        match super::gpu_resize::GpuResizer::new() {
            Ok(gpu) => {
                tracing::info!(adapter = %gpu.adapter_name(), "gpu resize available");
                return Arc::new(gpu);
            }
            Err(e) => tracing::info!(error = %e, "gpu resize unavailable, using cpu"),
        }
        #[cfg(not(feature = "gpu"))]
        tracing::debug!("gpu resize requested but the `gpu` feature is not compiled in");
    }
    Arc::new(CpuResizer)
}
