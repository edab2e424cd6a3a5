use std::path::{Path, PathBuf};
use std::time::Duration;

use super::*;
use crate::config::FrameFormat;
use crate::foundation::core::{FrameIndex, Rgb8, Size};
use crate::render::RenderFrame;

fn sink_cfg(frames: u64) -> SinkConfig {
    SinkConfig {
        width: 4,
        height: 2,
        fps: 10,
        frame_count: frames,
    }
}

fn frame(i: u64) -> RenderFrame {
    RenderFrame::filled(FrameIndex(i), Size::new(4, 2), Rgb8::new(i as u8 * 10, 0, 0))
}

fn settings(out: &Path) -> EncoderSettings {
    EncoderSettings {
        ffmpeg_path: PathBuf::from("ffmpeg"),
        output_path: out.to_path_buf(),
        preset: "faster".to_string(),
        bitrate: "5M".to_string(),
        prefer_hardware: true,
    }
}

fn ffmpeg_on_path() -> bool {
    probe::is_ffmpeg_available(Path::new("ffmpeg"))
}

#[test]
fn in_memory_sink_accepts_ordered_frames() {
    let mut sink = InMemorySink::new();
    sink.begin(sink_cfg(3)).unwrap();
    for i in 0..3 {
        sink.push_frame(FrameIndex(i), &frame(i)).unwrap();
    }
    sink.end().unwrap();
    assert!(sink.is_ended());
    assert_eq!(sink.frames().len(), 3);
    assert_eq!(sink.config(), Some(sink_cfg(3)));
}

#[test]
fn sinks_reject_gaps_repeats_and_overruns() {
    let mut sink = InMemorySink::new();
    sink.begin(sink_cfg(2)).unwrap();
    assert!(sink.push_frame(FrameIndex(1), &frame(1)).is_err());
    sink.push_frame(FrameIndex(0), &frame(0)).unwrap();
    assert!(sink.push_frame(FrameIndex(0), &frame(0)).is_err());
    sink.push_frame(FrameIndex(1), &frame(1)).unwrap();
    assert!(sink.push_frame(FrameIndex(2), &frame(2)).is_err());
    sink.end().unwrap();
}

#[test]
fn sinks_reject_short_streams_and_bad_sizes() {
    let mut sink = InMemorySink::new();
    sink.begin(sink_cfg(3)).unwrap();
    sink.push_frame(FrameIndex(0), &frame(0)).unwrap();
    assert!(sink.end().is_err());

    let mut sink = InMemorySink::new();
    sink.begin(sink_cfg(1)).unwrap();
    let wrong = RenderFrame::filled(FrameIndex(0), Size::new(2, 2), Rgb8::WHITE);
    assert!(sink.push_frame(FrameIndex(0), &wrong).is_err());

    let mut odd = sink_cfg(1);
    odd.width = 5;
    assert!(InMemorySink::new().begin(odd).is_err());
}

#[test]
fn sequence_sink_writes_numbered_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = SequenceSink::new(dir.path(), FrameFormat::Png, 95);
    sink.begin(sink_cfg(3)).unwrap();
    for i in 0..3 {
        sink.push_frame(FrameIndex(i), &frame(i)).unwrap();
    }
    sink.end().unwrap();

    assert_eq!(sink.written(), 3);
    for i in 0..3 {
        assert!(dir.path().join(format!("frame_{i:05}.png")).is_file());
    }
    assert_eq!(sink.pattern(), dir.path().join("frame_%05d.png"));
    assert_eq!(
        SequenceSink::new(dir.path(), FrameFormat::Jpeg, 95).frame_path(FrameIndex(12)),
        dir.path().join("frame_00012.jpg")
    );
}

#[test]
fn sequence_sink_requires_existing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = SequenceSink::new(dir.path().join("missing"), FrameFormat::Jpeg, 95);
    assert!(sink.begin(sink_cfg(1)).is_err());
}

#[test]
fn encoder_list_is_ranked() {
    let text = "\
Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_qsv             H.264 / AVC (Intel Quick Sync Video acceleration) (codec h264)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 V....D h264_vaapi           H.264/AVC (VAAPI) (codec h264)
 A....D h264_amf             not really a video row
";
    assert_eq!(parse_encoder_list(text), vec!["h264_nvenc", "h264_qsv"]);
    assert!(parse_encoder_list("").is_empty());
}

#[test]
fn capability_selection() {
    let mut caps = EncoderCapabilities::software_only("ffmpeg");
    assert_eq!(caps.select(true), SOFTWARE_ENCODER);
    caps.usable_hardware = Some("h264_nvenc".to_string());
    assert_eq!(caps.select(true), "h264_nvenc");
    assert_eq!(caps.select(false), SOFTWARE_ENCODER);
}

#[test]
fn session_state_machine_negotiation() {
    let out = PathBuf::from("out.mp4");

    let mut s = EncoderSession::new(settings(&out));
    assert_eq!(s.state(), SessionState::Uninitialized);
    assert!(s.negotiate(&EncoderCapabilities::absent("ffmpeg")).is_err());
    assert_eq!(s.state(), SessionState::Closed(CloseStatus::Failed));

    let mut s = EncoderSession::new(settings(&out));
    assert_eq!(
        s.negotiate(&EncoderCapabilities::software_only("ffmpeg")).unwrap(),
        SOFTWARE_ENCODER
    );
    assert_eq!(s.state(), SessionState::SoftwareReady);
    assert!(!s.is_hardware());
    assert!(s.negotiate(&EncoderCapabilities::software_only("ffmpeg")).is_err());

    let mut caps = EncoderCapabilities::software_only("ffmpeg");
    caps.usable_hardware = Some("h264_videotoolbox".to_string());
    let mut s = EncoderSession::new(settings(&out));
    s.negotiate(&caps).unwrap();
    assert_eq!(s.state(), SessionState::HardwareReady);
    assert!(s.is_hardware());
}

#[test]
fn session_refuses_frames_before_start() {
    let mut s = EncoderSession::new(settings(Path::new("out.mp4")));
    assert!(s.write_frame(FrameIndex(0), &frame(0)).is_err());
    assert!(s.finish().is_err());
    assert!(s.start(sink_cfg(1)).is_err());
}

#[test]
fn command_line_for_both_inputs() {
    let s = settings(Path::new("out/clip.mp4"));
    let args = |cmd: std::process::Command| -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    };

    let raw = args(build_command(
        &s,
        SOFTWARE_ENCODER,
        &EncoderInput::RawPipe {
            width: 640,
            height: 360,
            fps: 30,
        },
    ));
    let joined = raw.join(" ");
    assert!(joined.contains("-f rawvideo -pix_fmt rgb24 -s 640x360 -r 30 -i pipe:0"));
    assert!(joined.contains("-c:v libx264 -preset faster -crf 23"));
    assert!(joined.contains("-pix_fmt yuv420p -movflags +faststart"));
    assert_eq!(raw.last().map(String::as_str), Some("out/clip.mp4"));

    let seq = args(build_command(
        &s,
        "h264_videotoolbox",
        &EncoderInput::Sequence {
            pattern: PathBuf::from("/tmp/x/frame_%05d.jpg"),
            fps: 24,
        },
    ))
    .join(" ");
    assert!(seq.contains("-framerate 24 -start_number 0 -i /tmp/x/frame_%05d.jpg"));
    assert!(seq.contains("-c:v h264_videotoolbox -b:v 5M -allow_sw 1 -profile:v high"));

    let nv = args(build_command(
        &s,
        "h264_nvenc",
        &EncoderInput::RawPipe {
            width: 2,
            height: 2,
            fps: 1,
        },
    ))
    .join(" ");
    assert!(nv.contains("-c:v h264_nvenc -b:v 5M"));
}

#[test]
fn missing_program_is_a_probe_error() {
    let cmd = std::process::Command::new("definitely-not-a-real-binary-tileslide");
    let err = run_with_timeout(cmd, Duration::from_secs(1)).unwrap_err();
    assert!(err.is_recoverable());

    let caps = probe_encoders(Path::new("definitely-not-a-real-binary-tileslide"), Duration::from_secs(1));
    assert!(!caps.ffmpeg_available);
    assert!(caps.usable_hardware.is_none());
}

#[cfg(unix)]
#[test]
fn slow_probe_times_out() {
    let mut cmd = std::process::Command::new("sleep");
    cmd.arg("5");
    let started = std::time::Instant::now();
    let err = run_with_timeout(cmd, Duration::from_millis(200)).unwrap_err();
    assert!(err.to_string().contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn streaming_session_encodes_when_ffmpeg_present() {
    if !ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/out.mp4");
    let mut s = EncoderSession::new(settings(&out));
    s.negotiate(&EncoderCapabilities::software_only("ffmpeg")).unwrap();

    let cfg = SinkConfig {
        width: 32,
        height: 16,
        fps: 10,
        frame_count: 5,
    };
    s.begin(cfg).unwrap();
    for i in 0..5 {
        let f = RenderFrame::filled(FrameIndex(i), Size::new(32, 16), Rgb8::new(0, 50 * i as u8, 0));
        s.push_frame(FrameIndex(i), &f).unwrap();
    }
    s.end().unwrap();
    assert_eq!(s.state(), SessionState::Closed(CloseStatus::Success));
    assert!(std::fs::metadata(&out).unwrap().len() > 0);
}

#[test]
fn sequence_encode_when_ffmpeg_present() {
    if !ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let frames = tempfile::tempdir().unwrap();
    let mut sink = SequenceSink::new(frames.path(), FrameFormat::Jpeg, 90);
    let cfg = SinkConfig {
        width: 32,
        height: 16,
        fps: 10,
        frame_count: 4,
    };
    sink.begin(cfg).unwrap();
    for i in 0..4 {
        let f = RenderFrame::filled(FrameIndex(i), Size::new(32, 16), Rgb8::new(200, 0, 0));
        sink.push_frame(FrameIndex(i), &f).unwrap();
    }
    sink.end().unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let out = out_dir.path().join("seq.mp4");
    let mut s = EncoderSession::new(settings(&out));
    s.negotiate(&EncoderCapabilities::software_only("ffmpeg")).unwrap();
    s.encode_sequence(&sink.pattern(), 10).unwrap();
    assert!(out.is_file());
}

#[test]
fn failed_encoder_reports_encode_error() {
    if !ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let out_dir = tempfile::tempdir().unwrap();
    let mut s = EncoderSession::new(settings(&out_dir.path().join("x.mp4")));
    s.negotiate(&EncoderCapabilities::software_only("ffmpeg")).unwrap();
    let err = s
        .encode_sequence(&out_dir.path().join("nothing_%05d.jpg"), 10)
        .unwrap_err();
    assert!(err.to_string().contains("encode error"));
    assert_eq!(s.state(), SessionState::Closed(CloseStatus::Failed));
}
