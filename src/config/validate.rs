use crate::foundation::error::{TileslideError, TileslideResult};

use super::PipelineConfig;

/// Largest accepted gap between tiles, in pixels.
pub const MAX_GAP: u32 = 10_000;

impl PipelineConfig {
    /// Validate that values are within the ranges the pipeline can honour.
    pub fn validate(&self) -> TileslideResult<()> {
        if self.start_image > self.end_image {
            return Err(TileslideError::validation(format!(
                "start_image ({}) must be <= end_image ({})",
                self.start_image, self.end_image
            )));
        }
        if self.aspect_w == 0 || self.aspect_h == 0 {
            return Err(TileslideError::validation(
                "aspect_w and aspect_h must be > 0",
            ));
        }
        if self.tile_height == 0 {
            return Err(TileslideError::validation("tile_height must be > 0"));
        }
        if self.grid_rows == 0 || self.grid_cols == 0 {
            return Err(TileslideError::validation(
                "grid_rows and grid_cols must be > 0",
            ));
        }
        if self.gap_horizontal > MAX_GAP || self.gap_vertical > MAX_GAP {
            return Err(TileslideError::validation(format!(
                "gap_horizontal and gap_vertical must be <= {MAX_GAP}, got {} and {}",
                self.gap_horizontal, self.gap_vertical
            )));
        }
        if self.fps == 0 {
            return Err(TileslideError::validation("fps must be > 0"));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(TileslideError::validation(
                "duration_secs must be a positive number",
            ));
        }
        if !(self.slide_speed.is_finite() && self.slide_speed > 0.0) {
            return Err(TileslideError::validation(
                "slide_speed must be a positive number",
            ));
        }
        if self.frame_count() == 0 {
            return Err(TileslideError::validation(
                "fps * duration_secs must round to at least one frame",
            ));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(TileslideError::validation(
                "frame_width and frame_height must be > 0",
            ));
        }
        if !(1..=100).contains(&self.memory_threshold_pct) {
            return Err(TileslideError::validation(
                "memory_threshold_pct must be between 1 and 100",
            ));
        }
        if self.batch_size == 0 {
            return Err(TileslideError::validation("batch_size must be > 0"));
        }
        if !(1..=100).contains(&self.frame_quality) {
            return Err(TileslideError::validation(
                "frame_quality must be between 1 and 100",
            ));
        }
        if self.probe_timeout_secs == 0 {
            return Err(TileslideError::validation("probe_timeout_secs must be > 0"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(TileslideError::validation("output_path must not be empty"));
        }
        Ok(())
    }
}
