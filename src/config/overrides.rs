use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::foundation::error::{TileslideError, TileslideResult};

use super::PipelineConfig;
use super::color::parse_background_color;

/// Flat override keys understood by [`PipelineConfig::apply_overrides`].
pub const OVERRIDE_KEYS: &[&str] = &[
    "START_IMAGE_NUMBER",
    "END_IMAGE_NUMBER",
    "IMAGE_HEIGHT",
    "GRID_ROWS",
    "GRID_COLS",
    "ANIMATION_DURATION",
    "FPS",
    "SLIDE_SPEED",
    "PARALLEL_PROCESSING",
    "USE_GPU",
    "USE_RAM_DISK",
    "USE_STREAMING",
    "USE_VIDEOTOOLBOX",
    "USE_HARDWARE_ENCODER",
    "MEMORY_BATCH_SIZE",
    "MEMORY_THRESHOLD",
    "WORKER_COUNT",
    "FFMPEG_PATH",
    "FFMPEG_PRESET",
    "BITRATE",
    "PROBE_TIMEOUT",
    "OUTPUT_FILENAME",
    "FRAME_SIZE_PRESET",
    "FRAME_WIDTH",
    "FRAME_HEIGHT",
    "ASPECT_RATIO_W",
    "ASPECT_RATIO_H",
    "CROP_POSITION",
    "BACKGROUND_COLOR",
    "GAP_HORIZONTAL",
    "GAP_VERTICAL",
    "FRAME_FORMAT",
    "FRAME_QUALITY",
];

impl PipelineConfig {
    /// Build a config from defaults plus a flat string map, then validate it.
    pub fn from_overrides(overrides: &BTreeMap<String, String>) -> TileslideResult<Self> {
        let mut cfg = Self::default();
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply a flat `KEY -> value` map on top of the current values.
    ///
    /// Unknown keys are ignored. A malformed value fails with a validation error naming the key.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, String>) -> TileslideResult<()> {
        for (key, raw) in overrides {
            let value = raw.trim();
            match key.as_str() {
                "START_IMAGE_NUMBER" => self.start_image = parse_num(key, value)?,
                "END_IMAGE_NUMBER" => self.end_image = parse_num(key, value)?,
                "IMAGE_HEIGHT" => self.tile_height = parse_num(key, value)?,
                "GRID_ROWS" => self.grid_rows = parse_num(key, value)?,
                "GRID_COLS" => self.grid_cols = parse_num(key, value)?,
                "ANIMATION_DURATION" => self.duration_secs = parse_num(key, value)?,
                "FPS" => self.fps = parse_num(key, value)?,
                "SLIDE_SPEED" => self.slide_speed = parse_num(key, value)?,
                "PARALLEL_PROCESSING" => self.use_parallel = parse_bool(key, value)?,
                "USE_GPU" => self.use_gpu = parse_bool(key, value)?,
                "USE_RAM_DISK" => self.use_ram_scratch = parse_bool(key, value)?,
                "USE_STREAMING" => self.use_streaming_encode = parse_bool(key, value)?,
                "USE_VIDEOTOOLBOX" | "USE_HARDWARE_ENCODER" => {
                    self.use_hardware_encoder = parse_bool(key, value)?
                }
                "MEMORY_BATCH_SIZE" => self.batch_size = parse_num(key, value)?,
                "MEMORY_THRESHOLD" => self.memory_threshold_pct = parse_num(key, value)?,
                "WORKER_COUNT" => self.worker_count = parse_num(key, value)?,
                "FFMPEG_PATH" => self.ffmpeg_path = PathBuf::from(value),
                "FFMPEG_PRESET" => self.ffmpeg_preset = value.to_string(),
                "BITRATE" => self.bitrate = value.to_string(),
                "PROBE_TIMEOUT" => self.probe_timeout_secs = parse_num(key, value)?,
                "OUTPUT_FILENAME" => self.output_path = PathBuf::from(value),
                "FRAME_SIZE_PRESET" => self.frame_size = value.parse()?,
                "FRAME_WIDTH" => self.frame_width = parse_num(key, value)?,
                "FRAME_HEIGHT" => self.frame_height = parse_num(key, value)?,
                "ASPECT_RATIO_W" => self.aspect_w = parse_num(key, value)?,
                "ASPECT_RATIO_H" => self.aspect_h = parse_num(key, value)?,
                "CROP_POSITION" => self.crop_anchor = value.parse()?,
                "BACKGROUND_COLOR" => self.background = parse_background_color(value),
                "GAP_HORIZONTAL" => self.gap_horizontal = parse_num(key, value)?,
                "GAP_VERTICAL" => self.gap_vertical = parse_num(key, value)?,
                "FRAME_FORMAT" => self.frame_format = value.parse()?,
                "FRAME_QUALITY" => self.frame_quality = parse_num(key, value)?,
                _ => tracing::debug!(key = %key, "ignoring unknown config override"),
            }
        }
        Ok(())
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> TileslideResult<T> {
    value.parse::<T>().map_err(|_| {
        TileslideError::validation(format!("{key}: '{value}' is not a valid number"))
    })
}

fn parse_bool(key: &str, value: &str) -> TileslideResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(TileslideError::validation(format!(
            "{key}: '{value}' is not a boolean (true/false)"
        ))),
    }
}
