use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{Rgb8, Size, frame_count};
use crate::foundation::error::TileslideError;

/// Which part of the source is kept when cropping to the target aspect ratio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropAnchor {
    /// Symmetric margins.
    #[default]
    Center,
    /// Keep the left edge (horizontal crops only).
    Left,
    /// Keep the right edge (horizontal crops only).
    Right,
    /// Keep the top edge (vertical crops only).
    Top,
    /// Keep the bottom edge (vertical crops only).
    Bottom,
}

impl FromStr for CropAnchor {
    type Err = TileslideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" => Ok(Self::Center),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            other => Err(TileslideError::validation(format!(
                "unknown crop anchor '{other}' (expected center|left|right|top|bottom)"
            ))),
        }
    }
}

/// How the output frame size is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameSizePolicy {
    /// Same size as the grid frame.
    #[default]
    Auto,
    /// 1920x1080.
    Hd,
    /// 1920x540.
    HdHalf,
    /// `frame_width` x `frame_height` from the config.
    Custom,
}

impl FromStr for FrameSizePolicy {
    type Err = TileslideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "HD" => Ok(Self::Hd),
            "HD_HALF" => Ok(Self::HdHalf),
            "CUSTOM" => Ok(Self::Custom),
            other => Err(TileslideError::validation(format!(
                "unknown frame size preset '{other}' (expected AUTO|HD|HD_HALF|CUSTOM)"
            ))),
        }
    }
}

/// Still-image format for intermediate frames on the file-sequence encode path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// Lossless PNG.
    Png,
    /// JPEG at `frame_quality`.
    #[default]
    Jpeg,
}

impl FrameFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

impl FromStr for FrameFormat {
    type Err = TileslideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            other => Err(TileslideError::validation(format!(
                "unknown frame format '{other}' (expected png|jpeg)"
            ))),
        }
    }
}

/// Immutable settings for one pipeline run.
///
/// Built once by the caller (defaults, then file, then flat overrides) and passed explicitly to
/// every stage. No stage reads process environment on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First source image number (inclusive).
    pub start_image: u32,
    /// Last source image number (inclusive).
    pub end_image: u32,

    /// Target tile aspect ratio, width part.
    pub aspect_w: u32,
    /// Target tile aspect ratio, height part.
    pub aspect_h: u32,
    /// Crop window anchor.
    pub crop_anchor: CropAnchor,
    /// Tile height in pixels after scaling.
    pub tile_height: u32,

    /// Grid rows.
    pub grid_rows: u32,
    /// Grid columns.
    pub grid_cols: u32,
    /// Horizontal gap between tiles in pixels.
    pub gap_horizontal: u32,
    /// Vertical gap between tiles in pixels.
    pub gap_vertical: u32,

    /// Animation length in seconds.
    pub duration_secs: f64,
    /// Output frame rate.
    pub fps: u32,
    /// Slide speed multiplier (1.0 = the grid crosses the frame exactly once).
    pub slide_speed: f64,

    /// Output frame size policy.
    pub frame_size: FrameSizePolicy,
    /// Width used with [`FrameSizePolicy::Custom`].
    pub frame_width: u32,
    /// Height used with [`FrameSizePolicy::Custom`].
    pub frame_height: u32,
    /// Background fill colour.
    pub background: Rgb8,

    /// Output video path.
    pub output_path: PathBuf,

    /// Preprocess tiles on several workers.
    pub use_parallel: bool,
    /// Try a GPU resize provider before the CPU one.
    pub use_gpu: bool,
    /// Try RAM-backed scratch storage before the standard temp dir.
    pub use_ram_scratch: bool,
    /// Stream raw frames into the encoder instead of writing an image sequence first.
    pub use_streaming_encode: bool,
    /// Prefer a hardware H.264 encoder when one is available.
    pub use_hardware_encoder: bool,

    /// Host memory utilization (percent) above which the worker pool backs off.
    pub memory_threshold_pct: u8,
    /// Worker count; `0` picks one from the host core count.
    pub worker_count: usize,
    /// Items per worker-pool batch (also the render chunk size).
    pub batch_size: usize,

    /// Encoder executable.
    pub ffmpeg_path: PathBuf,
    /// Software encoder preset.
    pub ffmpeg_preset: String,
    /// Target bitrate passed to the encoder.
    pub bitrate: String,
    /// Upper bound for capability probes, in seconds.
    pub probe_timeout_secs: u64,

    /// Intermediate frame format for the file-sequence path.
    pub frame_format: FrameFormat,
    /// JPEG quality for intermediate frames (1..=100).
    pub frame_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start_image: 1,
            end_image: 36,
            aspect_w: 4,
            aspect_h: 3,
            crop_anchor: CropAnchor::Center,
            tile_height: 100,
            grid_rows: 6,
            grid_cols: 6,
            gap_horizontal: 0,
            gap_vertical: 0,
            duration_secs: 4.0,
            fps: 30,
            slide_speed: 1.0,
            frame_size: FrameSizePolicy::Auto,
            frame_width: 1920,
            frame_height: 1080,
            background: Rgb8::WHITE,
            output_path: PathBuf::from("output/sliding_tiles.mp4"),
            use_parallel: true,
            use_gpu: true,
            use_ram_scratch: true,
            use_streaming_encode: true,
            use_hardware_encoder: true,
            memory_threshold_pct: 85,
            worker_count: 0,
            batch_size: 30,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffmpeg_preset: "faster".to_string(),
            bitrate: "5M".to_string(),
            probe_timeout_secs: 10,
            frame_format: FrameFormat::Jpeg,
            frame_quality: 95,
        }
    }
}

impl PipelineConfig {
    /// Number of frames the run writes: `round(fps * duration)`.
    pub fn frame_count(&self) -> u64 {
        frame_count(self.fps, self.duration_secs)
    }

    /// Grid capacity (`rows * cols`).
    pub fn grid_capacity(&self) -> usize {
        (self.grid_rows as usize).saturating_mul(self.grid_cols as usize)
    }

    /// Resolve the output frame size for a grid frame of `grid` pixels.
    ///
    /// Odd dimensions are rounded up to even.
    pub fn final_size(&self, grid: Size) -> Size {
        let raw = match self.frame_size {
            FrameSizePolicy::Auto => grid,
            FrameSizePolicy::Hd => Size::new(1920, 1080),
            FrameSizePolicy::HdHalf => Size::new(1920, 540),
            FrameSizePolicy::Custom => Size::new(self.frame_width, self.frame_height),
        };
        raw.even_ceil()
    }
}
