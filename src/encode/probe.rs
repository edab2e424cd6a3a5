use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::foundation::error::{TileslideError, TileslideResult};

/// Hardware H.264 encoders in order of preference.
pub const HARDWARE_ENCODERS: &[&str] = &[
    "h264_videotoolbox",
    "h264_nvenc",
    "h264_qsv",
    "h264_amf",
];

/// Software H.264 encoder used when no hardware encoder is usable.
pub const SOFTWARE_ENCODER: &str = "libx264";

/// What the local `ffmpeg` can do, probed once per run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncoderCapabilities {
    /// Executable the probe ran.
    pub ffmpeg_path: PathBuf,
    /// `ffmpeg -version` answered successfully.
    pub ffmpeg_available: bool,
    /// First line of `ffmpeg -version`.
    pub ffmpeg_version: Option<String>,
    /// Hardware encoders listed by `ffmpeg -encoders`, best first.
    pub listed_hardware: Vec<String>,
    /// Best listed hardware encoder that also passed a one-frame test encode.
    pub usable_hardware: Option<String>,
}

impl EncoderCapabilities {
    /// Capabilities of a host without `ffmpeg`.
    pub fn absent(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ..Self::default()
        }
    }

    /// Capabilities of an `ffmpeg` that only offers the software encoder.
    pub fn software_only(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffmpeg_available: true,
            ..Self::default()
        }
    }

    /// Codec to use: the usable hardware encoder when `prefer_hardware`, else software.
    pub fn select(&self, prefer_hardware: bool) -> &str {
        match (&self.usable_hardware, prefer_hardware) {
            (Some(hw), true) => hw,
            _ => SOFTWARE_ENCODER,
        }
    }
}

/// Captured output of a finished probe process.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Standard output bytes.
    pub stdout: Vec<u8>,
    /// Standard error bytes.
    pub stderr: Vec<u8>,
}

/// Run `cmd` to completion, killing it after `timeout`.
///
/// Spawn failures and timeouts are capability-probe errors.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> TileslideResult<ProcessOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| TileslideError::capability_probe(format!("failed to run '{program}': {e}")))?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TileslideError::capability_probe(format!(
                    "'{program}' timed out after {}s",
                    timeout.as_secs_f32()
                )));
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => {
                let _ = child.kill();
                return Err(TileslideError::capability_probe(format!(
                    "failed to wait for '{program}': {e}"
                )));
            }
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: stdout.map(join_drain).unwrap_or_default(),
        stderr: stderr.map(join_drain).unwrap_or_default(),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = reader.read_to_end(&mut bytes);
        bytes
    })
}

fn join_drain(handle: std::thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

/// Hardware encoders named in `ffmpeg -encoders` output, ranked by [`HARDWARE_ENCODERS`].
///
/// Only video encoder rows (flags starting with `V`) count.
pub fn parse_encoder_list(text: &str) -> Vec<String> {
    let listed: Vec<&str> = text
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            (flags.len() == 6 && flags.starts_with('V')).then_some(name)
        })
        .collect();

    HARDWARE_ENCODERS
        .iter()
        .filter(|hw| listed.contains(*hw))
        .map(|hw| hw.to_string())
        .collect()
}

/// Probe `ffmpeg` for availability and hardware encoders.
///
/// Never fails: anything that goes wrong, including a timeout, just means the capability is
/// absent.
pub fn probe_encoders(ffmpeg: &Path, timeout: Duration) -> EncoderCapabilities {
    let mut version_cmd = Command::new(ffmpeg);
    version_cmd.arg("-version");
    let version = match run_with_timeout(version_cmd, timeout) {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .next()
            .map(str::to_string),
        Ok(out) => {
            tracing::warn!(status = %out.status, "ffmpeg -version failed");
            return EncoderCapabilities::absent(ffmpeg);
        }
        Err(e) => {
            tracing::warn!(error = %e, ffmpeg = %ffmpeg.display(), "ffmpeg not usable");
            return EncoderCapabilities::absent(ffmpeg);
        }
    };

    let mut caps = EncoderCapabilities {
        ffmpeg_version: version,
        ..EncoderCapabilities::software_only(ffmpeg)
    };

    let mut list_cmd = Command::new(ffmpeg);
    list_cmd.args(["-hide_banner", "-encoders"]);
    match run_with_timeout(list_cmd, timeout) {
        Ok(out) if out.status.success() => {
            caps.listed_hardware = parse_encoder_list(&String::from_utf8_lossy(&out.stdout));
        }
        Ok(out) => tracing::debug!(status = %out.status, "ffmpeg -encoders failed"),
        Err(e) => tracing::debug!(error = %e, "ffmpeg -encoders probe failed"),
    }

    caps.usable_hardware = caps
        .listed_hardware
        .iter()
        .find(|codec| test_encode(ffmpeg, codec, timeout))
        .cloned();

    tracing::info!(
        ffmpeg = caps.ffmpeg_version.as_deref().unwrap_or("unknown"),
        listed = ?caps.listed_hardware,
        usable = caps.usable_hardware.as_deref().unwrap_or("none"),
        "encoder capabilities"
    );
    caps
}

/// Encode a few synthetic frames with `codec` to check the device behind it actually works.
fn test_encode(ffmpeg: &Path, codec: &str, timeout: Duration) -> bool {
    let mut cmd = Command::new(ffmpeg);
    cmd.args([
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "lavfi",
        "-i",
        "color=c=black:s=256x256:r=30:d=0.1",
        "-c:v",
        codec,
        "-pix_fmt",
        "yuv420p",
        "-f",
        "null",
        "-",
    ]);
    match run_with_timeout(cmd, timeout) {
        Ok(out) if out.status.success() => true,
        Ok(out) => {
            tracing::debug!(
                codec,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "hardware encoder listed but not usable"
            );
            false
        }
        Err(e) => {
            tracing::debug!(codec, error = %e, "hardware encoder test failed");
            false
        }
    }
}

/// Whether `ffmpeg` at `path` answers `-version` within a few seconds.
pub fn is_ffmpeg_available(path: &Path) -> bool {
    let mut cmd = Command::new(path);
    cmd.arg("-version");
    run_with_timeout(cmd, Duration::from_secs(5))
        .map(|out| out.status.success())
        .unwrap_or(false)
}
