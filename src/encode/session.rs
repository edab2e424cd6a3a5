use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::Context as _;

use super::probe::{EncoderCapabilities, SOFTWARE_ENCODER};
use super::sink::{FrameOrder, FrameSink, SinkConfig};
use crate::config::PipelineConfig;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{TileslideError, TileslideResult};
use crate::render::RenderFrame;

/// Encoder-facing settings taken from the pipeline config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    /// `ffmpeg` executable.
    pub ffmpeg_path: PathBuf,
    /// Output video file.
    pub output_path: PathBuf,
    /// x264 preset.
    pub preset: String,
    /// Target bitrate for hardware encoders (`5M`, ...).
    pub bitrate: String,
    /// Use a hardware encoder when one is usable.
    pub prefer_hardware: bool,
}

impl EncoderSettings {
    /// Settings of `cfg`.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            ffmpeg_path: cfg.ffmpeg_path.clone(),
            output_path: cfg.output_path.clone(),
            preset: cfg.ffmpeg_preset.clone(),
            bitrate: cfg.bitrate.clone(),
            prefer_hardware: cfg.use_hardware_encoder,
        }
    }
}

/// Where `ffmpeg` reads frames from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncoderInput {
    /// Raw RGB24 frames of `width` x `height` on stdin.
    RawPipe {
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
        /// Frames per second.
        fps: u32,
    },
    /// Numbered image files matching a printf-style `pattern` (`frame_%05d.jpg`).
    Sequence {
        /// Input pattern.
        pattern: PathBuf,
        /// Frames per second.
        fps: u32,
    },
}

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseStatus {
    /// Encoder exited cleanly.
    Success,
    /// Encoder failed or the session was abandoned.
    Failed,
}

/// Lifecycle of an [`EncoderSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing known yet.
    Uninitialized,
    /// Capabilities received, codec not yet chosen.
    CapabilityProbed,
    /// A hardware encoder is selected.
    HardwareReady,
    /// The software encoder is selected.
    SoftwareReady,
    /// `ffmpeg` is running and accepting frames.
    Streaming,
    /// Terminal state.
    Closed(CloseStatus),
}

/// One `ffmpeg` process producing one output file.
///
/// The session is the only writer of the encoder's stdin. Dropping a session that is still
/// streaming kills the process.
pub struct EncoderSession {
    settings: EncoderSettings,
    state: SessionState,
    codec: Option<String>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    order: Option<FrameOrder>,
}

impl EncoderSession {
    /// New session in [`SessionState::Uninitialized`].
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            state: SessionState::Uninitialized,
            codec: None,
            child: None,
            stdin: None,
            stderr_drain: None,
            order: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Selected codec, once negotiated.
    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    /// Whether the selected codec is a hardware encoder.
    pub fn is_hardware(&self) -> bool {
        self.codec
            .as_deref()
            .is_some_and(|c| c != SOFTWARE_ENCODER)
    }

    /// Choose the codec from cached capabilities.
    ///
    /// Fails with an encode error when `ffmpeg` itself is unavailable.
    pub fn negotiate(&mut self, caps: &EncoderCapabilities) -> TileslideResult<&str> {
        if self.state != SessionState::Uninitialized {
            return Err(TileslideError::encode(format!(
                "cannot negotiate in state {:?}",
                self.state
            )));
        }
        self.state = SessionState::CapabilityProbed;
        if !caps.ffmpeg_available {
            self.state = SessionState::Closed(CloseStatus::Failed);
            return Err(TileslideError::encode(format!(
                "ffmpeg is required but '{}' could not be run",
                self.settings.ffmpeg_path.display()
            )));
        }

        let codec = caps.select(self.settings.prefer_hardware).to_string();
        self.state = if codec == SOFTWARE_ENCODER {
            SessionState::SoftwareReady
        } else {
            SessionState::HardwareReady
        };
        tracing::info!(
            codec = %codec,
            hardware = codec != SOFTWARE_ENCODER,
            "encoder selected"
        );
        Ok(self.codec.insert(codec).as_str())
    }

    fn ready_codec(&self) -> TileslideResult<String> {
        match (self.state, &self.codec) {
            (SessionState::HardwareReady | SessionState::SoftwareReady, Some(codec)) => {
                Ok(codec.clone())
            }
            _ => Err(TileslideError::encode(format!(
                "encoder not ready (state {:?})",
                self.state
            ))),
        }
    }

    /// Spawn `ffmpeg` reading raw frames from stdin.
    pub fn start(&mut self, cfg: SinkConfig) -> TileslideResult<()> {
        cfg.validate()?;
        let codec = self.ready_codec()?;
        ensure_parent_dir(&self.settings.output_path)?;

        let input = EncoderInput::RawPipe {
            width: cfg.width,
            height: cfg.height,
            fps: cfg.fps,
        };
        let mut cmd = build_command(&self.settings, &codec, &input);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            self.state = SessionState::Closed(CloseStatus::Failed);
            TileslideError::encode(format!(
                "failed to spawn '{}': {e}",
                self.settings.ffmpeg_path.display()
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TileslideError::encode("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TileslideError::encode("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        tracing::debug!(
            codec = %codec,
            width = cfg.width,
            height = cfg.height,
            fps = cfg.fps,
            "ffmpeg started"
        );
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.order = Some(FrameOrder::new(&cfg));
        self.state = SessionState::Streaming;
        Ok(())
    }

    /// Write one frame; blocks while the encoder's pipe is full.
    pub fn write_frame(&mut self, idx: FrameIndex, frame: &RenderFrame) -> TileslideResult<()> {
        if self.state != SessionState::Streaming {
            return Err(TileslideError::encode(format!(
                "write_frame in state {:?}",
                self.state
            )));
        }
        let order = self
            .order
            .as_mut()
            .ok_or_else(|| TileslideError::encode("encoder session not started"))?;
        order.accept(idx, frame)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TileslideError::encode("encoder input is already closed"));
        };
        if let Err(e) = stdin.write_all(&frame.data) {
            let detail = self.abort();
            return Err(TileslideError::encode(format!(
                "failed to write frame {} to ffmpeg: {e}{detail}",
                idx.0
            )));
        }
        Ok(())
    }

    /// Close stdin and wait for `ffmpeg`; a non-zero exit is an encode error.
    pub fn finish(&mut self) -> TileslideResult<()> {
        if self.state != SessionState::Streaming {
            return Err(TileslideError::encode(format!(
                "finish in state {:?}",
                self.state
            )));
        }
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| TileslideError::encode("encoder session not started"))?;
        let status = child.wait().map_err(|e| {
            self.state = SessionState::Closed(CloseStatus::Failed);
            TileslideError::encode(format!("failed to wait for ffmpeg: {e}"))
        })?;
        let stderr = self.collect_stderr();

        if !status.success() {
            self.state = SessionState::Closed(CloseStatus::Failed);
            return Err(TileslideError::encode(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        if let Some(order) = self.order.take()
            && let Err(e) = order.finish()
        {
            self.state = SessionState::Closed(CloseStatus::Failed);
            return Err(e);
        }
        self.state = SessionState::Closed(CloseStatus::Success);
        Ok(())
    }

    /// Encode an existing numbered image sequence (non-streaming path).
    pub fn encode_sequence(&mut self, pattern: &Path, fps: u32) -> TileslideResult<()> {
        let codec = self.ready_codec()?;
        ensure_parent_dir(&self.settings.output_path)?;
        let input = EncoderInput::Sequence {
            pattern: pattern.to_path_buf(),
            fps,
        };
        let mut cmd = build_command(&self.settings, &codec, &input);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        self.state = SessionState::Streaming;
        let out = cmd.output().map_err(|e| {
            self.state = SessionState::Closed(CloseStatus::Failed);
            TileslideError::encode(format!(
                "failed to spawn '{}': {e}",
                self.settings.ffmpeg_path.display()
            ))
        })?;
        if !out.status.success() {
            self.state = SessionState::Closed(CloseStatus::Failed);
            return Err(TileslideError::encode(format!(
                "ffmpeg exited with status {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        self.state = SessionState::Closed(CloseStatus::Success);
        Ok(())
    }

    /// Kill the process after a pipe failure and return its stderr as message detail.
    fn abort(&mut self) -> String {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.state = SessionState::Closed(CloseStatus::Failed);
        let stderr = self.collect_stderr();
        let stderr = stderr.trim();
        if stderr.is_empty() {
            String::new()
        } else {
            format!(" (ffmpeg: {stderr})")
        }
    }

    fn collect_stderr(&mut self) -> String {
        match self.stderr_drain.take().map(|h| h.join()) {
            Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => String::new(),
        }
    }
}

impl FrameSink for EncoderSession {
    fn begin(&mut self, cfg: SinkConfig) -> TileslideResult<()> {
        self.start(cfg)
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &RenderFrame) -> TileslideResult<()> {
        self.write_frame(idx, frame)
    }

    fn end(&mut self) -> TileslideResult<()> {
        self.finish()
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        if self.child.is_some() {
            tracing::debug!("encoder session dropped while streaming, killing ffmpeg");
            let _ = self.abort();
        }
    }
}

/// Codec-specific output arguments.
pub fn codec_args(codec: &str, settings: &EncoderSettings) -> Vec<String> {
    let mut args = vec!["-c:v".to_string(), codec.to_string()];
    match codec {
        SOFTWARE_ENCODER => {
            args.extend([
                "-preset".into(),
                settings.preset.clone(),
                "-crf".into(),
                "23".into(),
            ]);
        }
        "h264_videotoolbox" => {
            args.extend([
                "-b:v".into(),
                settings.bitrate.clone(),
                "-allow_sw".into(),
                "1".into(),
                "-profile:v".into(),
                "high".into(),
            ]);
        }
        _ => args.extend(["-b:v".into(), settings.bitrate.clone()]),
    }
    args
}

/// Full `ffmpeg` command for `codec` reading `input` and writing `settings.output_path`.
pub fn build_command(settings: &EncoderSettings, codec: &str, input: &EncoderInput) -> Command {
    let mut cmd = Command::new(&settings.ffmpeg_path);
    cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
    match input {
        EncoderInput::RawPipe { width, height, fps } => {
            cmd.args([
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{width}x{height}"),
                "-r",
                &fps.to_string(),
                "-i",
                "pipe:0",
            ]);
        }
        EncoderInput::Sequence { pattern, fps } => {
            cmd.args(["-framerate", &fps.to_string(), "-start_number", "0", "-i"])
                .arg(pattern);
        }
    }
    cmd.arg("-an")
        .args(codec_args(codec, settings))
        .args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"])
        .arg(&settings.output_path);
    cmd
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> TileslideResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
