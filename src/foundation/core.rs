use crate::foundation::error::{TileslideError, TileslideResult};

/// Absolute 0-based output frame index.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// Presentation time of this frame in seconds at `fps`.
    pub fn time_secs(self, fps: u32) -> f64 {
        if fps == 0 {
            return 0.0;
        }
        (self.0 as f64) / f64::from(fps)
    }
}

/// Number of frames in a clip of `duration_secs` at `fps`, rounded to the nearest frame.
pub fn frame_count(fps: u32, duration_secs: f64) -> u64 {
    (f64::from(fps) * duration_secs).round().max(0.0) as u64
}

/// Pixel dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a size value.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Byte length of a tightly packed RGB24 buffer of this size.
    pub fn rgb_len(self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(3)
    }

    /// Round both dimensions up to the next even value (4:2:0 chroma needs even sizes).
    pub fn even_ceil(self) -> Self {
        fn up(v: u32) -> u32 {
            if v.is_multiple_of(2) { v } else { v.saturating_add(1) }
        }
        Self {
            width: up(self.width),
            height: up(self.height),
        }
    }
}

/// Opaque RGB8 colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgb8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb8 {
    /// Create a colour from channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// White.
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Channels as an array in RGB order.
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Build from a `[r, g, b]` slice of integers, rejecting out-of-range channels.
    pub fn from_components(parts: &[i64]) -> TileslideResult<Self> {
        let [r, g, b] = parts else {
            return Err(TileslideError::validation(format!(
                "colour needs exactly 3 components, got {}",
                parts.len()
            )));
        };
        let channel = |v: i64| {
            u8::try_from(v).map_err(|_| {
                TileslideError::validation(format!("colour component {v} is outside 0..=255"))
            })
        };
        Ok(Self::new(channel(*r)?, channel(*g)?, channel(*b)?))
    }
}

impl Default for Rgb8 {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
