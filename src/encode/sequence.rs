use std::path::{Path, PathBuf};

use crate::assets::encode_image;
use crate::config::FrameFormat;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{TileslideError, TileslideResult};
use crate::render::RenderFrame;

use super::sink::{FrameOrder, FrameSink, SinkConfig};

/// Writes frames as numbered still images (`frame_00000.jpg`, ...) for the non-streaming
/// encode path.
#[derive(Debug)]
pub struct SequenceSink {
    dir: PathBuf,
    format: FrameFormat,
    quality: u8,
    order: Option<FrameOrder>,
    written: u64,
}

impl SequenceSink {
    /// Sink writing into the existing directory `dir`.
    pub fn new(dir: impl Into<PathBuf>, format: FrameFormat, quality: u8) -> Self {
        Self {
            dir: dir.into(),
            format,
            quality,
            order: None,
            written: 0,
        }
    }

    /// Path of frame `idx`.
    pub fn frame_path(&self, idx: FrameIndex) -> PathBuf {
        self.dir
            .join(format!("frame_{:05}.{}", idx.0, self.format.extension()))
    }

    /// printf-style input pattern for `ffmpeg`.
    pub fn pattern(&self) -> PathBuf {
        self.dir
            .join(format!("frame_%05d.{}", self.format.extension()))
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Frames written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for SequenceSink {
    fn begin(&mut self, cfg: SinkConfig) -> TileslideResult<()> {
        cfg.validate()?;
        if !self.dir.is_dir() {
            return Err(TileslideError::validation(format!(
                "sequence directory '{}' does not exist",
                self.dir.display()
            )));
        }
        self.order = Some(FrameOrder::new(&cfg));
        self.written = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &RenderFrame) -> TileslideResult<()> {
        let order = self
            .order
            .as_mut()
            .ok_or_else(|| TileslideError::validation("sequence sink not started"))?;
        order.accept(idx, frame)?;
        let written = order.accepted();
        encode_image(
            &frame.data,
            frame.size,
            &self.frame_path(idx),
            self.format,
            self.quality,
        )?;
        self.written = written;
        Ok(())
    }

    fn end(&mut self) -> TileslideResult<()> {
        let order = self
            .order
            .take()
            .ok_or_else(|| TileslideError::validation("sequence sink not started"))?;
        order.finish()
    }
}
