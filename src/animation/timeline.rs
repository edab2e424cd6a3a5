use crate::foundation::core::Size;

/// Horizontal slide of the grid frame across the final frame.
///
/// At progress 0 the grid's left edge sits on the right edge of the frame; at progress 1 its
/// right edge sits on the left edge. `slide_speed` scales progress, so speeds above 1 finish
/// the crossing early and speeds below 1 never complete it.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnimationTimeline {
    /// Animation length in seconds.
    pub duration: f64,
    /// Progress multiplier.
    pub slide_speed: f64,
    /// Final frame size.
    pub frame: Size,
    /// Grid frame size.
    pub grid: Size,
}

impl AnimationTimeline {
    /// Build a timeline.
    pub fn new(duration: f64, slide_speed: f64, frame: Size, grid: Size) -> Self {
        Self {
            duration,
            slide_speed,
            frame,
            grid,
        }
    }

    /// Slide progress at `t` seconds: `clamp(t / duration, 0, 1) * slide_speed`.
    pub fn progress(&self, t: f64) -> f64 {
        slide_progress(t, self.duration, self.slide_speed)
    }

    /// Top-left of the grid frame inside the final frame at `t` seconds.
    pub fn offset(&self, t: f64) -> (i64, i64) {
        offset(
            t,
            self.duration,
            self.slide_speed,
            self.frame.width,
            self.frame.height,
            self.grid.width,
            self.grid.height,
        )
    }
}

/// `clamp(t / duration, 0, 1) * slide_speed`; `0` for a non-positive duration or non-finite `t`.
pub fn slide_progress(t: f64, duration: f64, slide_speed: f64) -> f64 {
    if duration <= 0.0 || !t.is_finite() {
        return 0.0;
    }
    (t / duration).clamp(0.0, 1.0) * slide_speed
}

/// Grid position at `t`; see [`AnimationTimeline`].
///
/// `x` is floored so every frame maps to one integer pixel column. `y` centres the grid
/// vertically when it is shorter than the frame and pins it to the top otherwise.
pub fn offset(
    t: f64,
    duration: f64,
    slide_speed: f64,
    final_w: u32,
    final_h: u32,
    grid_w: u32,
    grid_h: u32,
) -> (i64, i64) {
    let progress = slide_progress(t, duration, slide_speed);
    let travel = f64::from(final_w) + f64::from(grid_w);
    let x = (f64::from(final_w) - travel * progress).floor() as i64;
    let y = if final_h > grid_h {
        i64::from((final_h - grid_h) / 2)
    } else {
        0
    };
    (x, y)
}
