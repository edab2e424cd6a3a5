use crate::foundation::core::{FrameIndex, Size};
use crate::foundation::error::{TileslideError, TileslideResult};
use crate::render::RenderFrame;

/// Stream parameters handed to a [`FrameSink`] before the first frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: u32,
    /// Exact number of frames that will be pushed.
    pub frame_count: u64,
}

impl SinkConfig {
    /// Frame size.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub(crate) fn validate(&self) -> TileslideResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TileslideError::validation("sink width/height must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(TileslideError::validation(format!(
                "sink size {}x{} must be even (yuv420p output)",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(TileslideError::validation("sink fps must be non-zero"));
        }
        Ok(())
    }
}

/// Consumer of rendered frames.
///
/// Ordering contract: `push_frame` is called with indices `0, 1, ..., frame_count - 1`, each
/// exactly once and in that order. Sinks reject anything else.
pub trait FrameSink: Send {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> TileslideResult<()>;
    /// Push the next frame.
    fn push_frame(&mut self, idx: FrameIndex, frame: &RenderFrame) -> TileslideResult<()>;
    /// Called once after the last frame is pushed.
    fn end(&mut self) -> TileslideResult<()>;
}

/// Enforces the gap-free, strictly increasing frame order and the frame geometry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameOrder {
    size: Size,
    next: u64,
    total: u64,
}

impl FrameOrder {
    pub(crate) fn new(cfg: &SinkConfig) -> Self {
        Self {
            size: cfg.size(),
            next: 0,
            total: cfg.frame_count,
        }
    }

    /// Frames accepted so far.
    pub(crate) fn accepted(&self) -> u64 {
        self.next
    }

    pub(crate) fn accept(&mut self, idx: FrameIndex, frame: &RenderFrame) -> TileslideResult<()> {
        if idx.0 != self.next {
            return Err(TileslideError::validation(format!(
                "frame {} pushed out of order, expected frame {}",
                idx.0, self.next
            )));
        }
        if idx.0 >= self.total {
            return Err(TileslideError::validation(format!(
                "frame {} is past the configured count of {}",
                idx.0, self.total
            )));
        }
        if frame.size != self.size || !frame.is_well_formed() {
            return Err(TileslideError::validation(format!(
                "frame size mismatch: got {}x{} ({} bytes), expected {}x{}",
                frame.size.width,
                frame.size.height,
                frame.data.len(),
                self.size.width,
                self.size.height
            )));
        }
        self.next += 1;
        Ok(())
    }

    pub(crate) fn finish(&self) -> TileslideResult<()> {
        if self.next != self.total {
            return Err(TileslideError::validation(format!(
                "sink ended after {} of {} frames",
                self.next, self.total
            )));
        }
        Ok(())
    }
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    order: Option<FrameOrder>,
    frames: Vec<RenderFrame>,
    ended: bool,
}

impl InMemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    /// Captured frames in push order.
    pub fn frames(&self) -> &[RenderFrame] {
        &self.frames
    }

    /// Whether `end` completed.
    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> TileslideResult<()> {
        cfg.validate()?;
        self.order = Some(FrameOrder::new(&cfg));
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &RenderFrame) -> TileslideResult<()> {
        let order = self
            .order
            .as_mut()
            .ok_or_else(|| TileslideError::validation("in-memory sink not started"))?;
        order.accept(idx, frame)?;
        self.frames.push(frame.clone());
        Ok(())
    }

    fn end(&mut self) -> TileslideResult<()> {
        let order = self
            .order
            .take()
            .ok_or_else(|| TileslideError::validation("in-memory sink not started"))?;
        order.finish()?;
        self.ended = true;
        Ok(())
    }
}
