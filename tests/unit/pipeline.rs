use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use image::{Rgb, RgbImage};

use super::*;
use crate::assets::CpuResizer;
use crate::config::{FrameSizePolicy, PipelineConfig};
use crate::encode::{EncoderCapabilities, FrameSink, InMemorySink, SOFTWARE_ENCODER};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::TileslideError;
use crate::host::{HostProbe, MemorySnapshot, Platform};
use crate::scratch::ScratchManager;

struct RoomyHost;

impl HostProbe for RoomyHost {
    fn logical_cpus(&self) -> usize {
        4
    }

    fn memory(&self) -> MemorySnapshot {
        MemorySnapshot {
            total_bytes: 16 << 30,
            available_bytes: 12 << 30,
        }
    }

    fn platform(&self) -> Platform {
        Platform {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            version: None,
        }
    }
}

/// Roomy memory but a nearly full tmpfs.
struct SmallShmHost;

impl HostProbe for SmallShmHost {
    fn logical_cpus(&self) -> usize {
        RoomyHost.logical_cpus()
    }

    fn memory(&self) -> MemorySnapshot {
        RoomyHost.memory()
    }

    fn platform(&self) -> Platform {
        RoomyHost.platform()
    }

    fn free_space(&self, _path: &Path) -> Option<u64> {
        Some(1 << 10)
    }
}

fn write_image(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(40, 30, Rgb(color))
        .save(&path)
        .unwrap();
    path
}

fn cfg(out: &Path) -> PipelineConfig {
    PipelineConfig {
        grid_rows: 1,
        grid_cols: 2,
        tile_height: 12,
        aspect_w: 4,
        aspect_h: 3,
        fps: 10,
        duration_secs: 1.0,
        frame_size: FrameSizePolicy::Custom,
        frame_width: 64,
        frame_height: 24,
        batch_size: 4,
        use_gpu: false,
        use_ram_scratch: false,
        output_path: out.to_path_buf(),
        ..PipelineConfig::default()
    }
}

fn software_caps() -> Capabilities {
    Capabilities::new(
        Arc::new(CpuResizer),
        EncoderCapabilities::software_only("ffmpeg"),
    )
}

fn pipeline(cfg: PipelineConfig, caps: Capabilities) -> Pipeline {
    Pipeline::new(cfg)
        .unwrap()
        .with_host(Arc::new(RoomyHost))
        .with_capabilities(caps)
        .with_pressure_pause(Duration::ZERO)
}

fn ffmpeg_on_path() -> bool {
    crate::encode::probe::is_ffmpeg_available(Path::new("ffmpeg"))
}

#[test]
fn discovery_prefers_jpeg_and_skips_gaps() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "image_01.png", [1, 1, 1]);
    write_image(dir.path(), "image_01.jpeg", [1, 1, 1]);
    write_image(dir.path(), "image_03.jpg", [3, 3, 3]);
    write_image(dir.path(), "image_04.png", [4, 4, 4]);

    let found = discover_sources(dir.path(), 1, 4);
    assert_eq!(
        found,
        vec![
            dir.path().join("image_01.jpeg"),
            dir.path().join("image_03.jpg"),
            dir.path().join("image_04.png"),
        ]
    );
    assert!(discover_sources(dir.path(), 5, 9).is_empty());
}

#[test]
fn progress_percent() {
    let e = ProgressEvent {
        stage: Stage::Render,
        done: 5,
        total: 20,
    };
    assert_eq!(e.percent(), 25.0);
    let empty = ProgressEvent {
        stage: Stage::Encode,
        done: 0,
        total: 0,
    };
    assert_eq!(empty.percent(), 100.0);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let mut bad = cfg(&dir.path().join("out.mp4"));
    bad.grid_rows = 0;
    assert!(matches!(
        Pipeline::new(bad),
        Err(TileslideError::Validation(_))
    ));
}

#[test]
fn failed_sources_are_skipped_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let red = write_image(dir.path(), "image_01.png", [200, 0, 0]);
    let broken = dir.path().join("image_02.png");
    std::fs::write(&broken, b"not an image").unwrap();
    let blue = write_image(dir.path(), "image_03.png", [0, 0, 200]);

    let p = pipeline(cfg(&dir.path().join("out.mp4")), software_caps());
    let pool = p.build_pool().unwrap();
    let out = p
        .preprocess_tiles(&[red, broken, blue], &pool, &CpuResizer)
        .unwrap();

    assert_eq!(out.failed, 1);
    assert_eq!(out.tiles.len(), 2);
    assert_eq!((out.tiles[0].width, out.tiles[0].height), (16, 12));
    assert_eq!(out.tiles[0].pixels.get_pixel(3, 3).0, [200, 0, 0]);
    assert_eq!(out.tiles[1].pixels.get_pixel(3, 3).0, [0, 0, 200]);
}

#[test]
fn no_usable_source_is_insufficient_input_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let broken = dir.path().join("image_01.png");
    std::fs::write(&broken, b"garbage").unwrap();

    let mut p = pipeline(cfg(&out), software_caps());
    let err = p.run(&[broken, dir.path().join("image_02.png")]).unwrap_err();
    assert!(matches!(err, TileslideError::InsufficientInput(_)));
    assert!(!out.exists());

    let err = p.run(&[]).unwrap_err();
    assert!(matches!(err, TileslideError::InsufficientInput(_)));
}

#[test]
fn missing_ffmpeg_fails_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let src = write_image(dir.path(), "image_01.png", [9, 9, 9]);
    let caps = Capabilities::new(Arc::new(CpuResizer), EncoderCapabilities::absent("ffmpeg"));

    let err = pipeline(cfg(&out), caps).run(&[src]).unwrap_err();
    assert!(matches!(err, TileslideError::Encode(_)));
    assert!(!out.exists());
}

#[test]
fn frames_reach_the_sink_in_order_with_progress() {
    let dir = tempfile::tempdir().unwrap();
    let srcs = [
        write_image(dir.path(), "image_01.png", [200, 0, 0]),
        write_image(dir.path(), "image_02.png", [0, 200, 0]),
        write_image(dir.path(), "image_03.png", [0, 0, 200]),
    ];
    let (tx, rx) = mpsc::channel();
    let p = pipeline(cfg(&dir.path().join("out.mp4")), software_caps()).with_progress(tx);
    let pool = p.build_pool().unwrap();
    let tiles = p.preprocess_tiles(&srcs, &pool, &CpuResizer).unwrap().tiles;
    let renderer = p.build_renderer(tiles).unwrap();
    assert_eq!(renderer.tile_count(), 2);

    let mut sink = InMemorySink::new();
    let pushed = p.render_to_sink(&renderer, &pool, &mut sink).unwrap();
    assert_eq!(pushed, 10);
    assert!(sink.is_ended());
    let indices: Vec<u64> = sink.frames().iter().map(|f| f.index.0).collect();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());
    assert!(sink.frames().iter().all(|f| f.is_well_formed()));

    let events: Vec<ProgressEvent> = rx.try_iter().collect();
    let render: Vec<_> = events.iter().filter(|e| e.stage == Stage::Render).collect();
    assert_eq!(render.len(), 3);
    assert_eq!(render.last().map(|e| (e.done, e.total)), Some((10, 10)));
    assert!(events.iter().any(|e| e.stage == Stage::Preprocess));
}

#[test]
fn worker_count_does_not_change_frames() {
    let dir = tempfile::tempdir().unwrap();
    let srcs = [
        write_image(dir.path(), "image_01.png", [250, 10, 10]),
        write_image(dir.path(), "image_02.png", [10, 250, 10]),
    ];
    let render_all = |parallel: bool, workers: usize| {
        let mut c = cfg(&dir.path().join("out.mp4"));
        c.use_parallel = parallel;
        c.worker_count = workers;
        let p = pipeline(c, software_caps());
        let pool = p.build_pool().unwrap();
        let tiles = p.preprocess_tiles(&srcs, &pool, &CpuResizer).unwrap().tiles;
        let renderer = p.build_renderer(tiles).unwrap();
        let mut sink = InMemorySink::new();
        p.render_to_sink(&renderer, &pool, &mut sink).unwrap();
        (pool.workers(), sink.frames().to_vec())
    };

    let (one, serial) = render_all(false, 4);
    let (three, parallel) = render_all(true, 3);
    assert_eq!((one, three), (1, 3));
    assert_eq!(serial, parallel);
}

#[test]
fn sink_errors_stop_rendering() {
    struct Refusing;
    impl FrameSink for Refusing {
        fn begin(&mut self, _cfg: crate::encode::SinkConfig) -> crate::TileslideResult<()> {
            Err(TileslideError::encode("no"))
        }
        fn push_frame(
            &mut self,
            _idx: FrameIndex,
            _frame: &crate::render::RenderFrame,
        ) -> crate::TileslideResult<()> {
            unreachable!("begin failed")
        }
        fn end(&mut self) -> crate::TileslideResult<()> {
            unreachable!("begin failed")
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let src = write_image(dir.path(), "image_01.png", [1, 2, 3]);
    let p = pipeline(cfg(&dir.path().join("out.mp4")), software_caps());
    let pool = p.build_pool().unwrap();
    let tiles = p.preprocess_tiles(&[src], &pool, &CpuResizer).unwrap().tiles;
    let renderer = p.build_renderer(tiles).unwrap();
    assert!(matches!(
        p.render_to_sink(&renderer, &pool, &mut Refusing),
        Err(TileslideError::Encode(_))
    ));
}

#[test]
fn streaming_run_when_ffmpeg_present() {
    if !ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("video/out.mp4");
    let srcs = [
        write_image(dir.path(), "image_01.png", [200, 0, 0]),
        write_image(dir.path(), "image_02.png", [0, 0, 200]),
    ];

    let report = pipeline(cfg(&out), software_caps()).run(&srcs).unwrap();
    assert_eq!(report.encoder, SOFTWARE_ENCODER);
    assert_eq!(report.input_mode, InputMode::Streaming);
    assert!(!report.fallback_used);
    assert_eq!(report.frame_count, 10);
    assert_eq!(report.tiles_used, 2);
    assert_eq!(report.scratch, None);
    assert!(std::fs::metadata(&out).unwrap().len() > 0);
}

#[test]
fn broken_hardware_encoder_falls_back_to_software_sequence() {
    if !ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let srcs = [write_image(dir.path(), "image_01.png", [0, 120, 0])];

    let mut encoders = EncoderCapabilities::software_only("ffmpeg");
    encoders.usable_hardware = Some("h264_not_a_real_encoder".to_string());
    let caps = Capabilities::new(Arc::new(CpuResizer), encoders);
    let scratch_root = tempfile::tempdir().unwrap();
    let scratch =
        ScratchManager::new(Arc::new(RoomyHost), false).with_disk_root(scratch_root.path());

    let report = pipeline(cfg(&out), caps)
        .with_scratch(scratch)
        .run(&srcs)
        .unwrap();
    assert!(report.fallback_used);
    assert_eq!(report.encoder, SOFTWARE_ENCODER);
    assert_eq!(report.input_mode, InputMode::Sequence);
    assert_eq!(report.scratch, Some(crate::scratch::ScratchKind::Disk));
    assert!(out.is_file());
    assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);
}

/// Shell script standing in for `ffmpeg`. Every call is appended to `ffmpeg.log` next to it.
/// A failing call still writes a partial output file before exiting non-zero.
#[cfg(unix)]
fn stub_ffmpeg(dir: &Path, pipe_ok: bool, sequence_ok: bool) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let outcome = |ok: bool| {
        if ok {
            "printf video > \"$out\"; exit 0"
        } else {
            "printf partial > \"$out\"; echo 'stub failure' >&2; exit 1"
        }
    };
    let log = dir.join("ffmpeg.log");
    let script = format!(
        "#!/bin/sh\n\
         echo \"$*\" >> '{log}'\n\
         for a in \"$@\"; do out=\"$a\"; done\n\
         case \"$*\" in\n\
         *pipe:0*) cat > /dev/null; {pipe} ;;\n\
         *) {sequence} ;;\n\
         esac\n",
        log = log.display(),
        pipe = outcome(pipe_ok),
        sequence = outcome(sequence_ok),
    );
    let path = dir.join("ffmpeg-stub");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    (path, log)
}

#[cfg(unix)]
fn stub_calls(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(unix)]
fn stub_run(
    dir: &Path,
    out: &Path,
    pipe_ok: bool,
    sequence_ok: bool,
    hardware: Option<&str>,
    tweak: impl FnOnce(&mut PipelineConfig),
) -> (crate::TileslideResult<RunReport>, Vec<String>, tempfile::TempDir) {
    let (stub, log) = stub_ffmpeg(dir, pipe_ok, sequence_ok);
    let srcs = [
        write_image(dir, "image_01.png", [200, 0, 0]),
        write_image(dir, "image_02.png", [0, 0, 200]),
    ];
    let mut c = cfg(out);
    c.ffmpeg_path = stub.clone();
    tweak(&mut c);

    let mut encoders = EncoderCapabilities::software_only(&stub);
    encoders.usable_hardware = hardware.map(str::to_string);
    let caps = Capabilities::new(Arc::new(CpuResizer), encoders);
    let scratch_root = tempfile::tempdir().unwrap();
    let scratch =
        ScratchManager::new(Arc::new(RoomyHost), false).with_disk_root(scratch_root.path());

    let result = pipeline(c, caps).with_scratch(scratch).run(&srcs);
    (result, stub_calls(&log), scratch_root)
}

#[cfg(unix)]
#[test]
fn failed_hardware_stream_falls_back_to_software_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("video/out.mp4");
    let (result, calls, scratch_root) =
        stub_run(dir.path(), &out, false, true, Some("h264_stub_hw"), |_| {});

    let report = result.unwrap();
    assert!(report.fallback_used);
    assert_eq!(report.input_mode, InputMode::Sequence);
    assert_eq!(report.encoder, SOFTWARE_ENCODER);
    assert_eq!(report.scratch, Some(crate::scratch::ScratchKind::Disk));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "video");
    assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);

    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("pipe:0") && calls[0].contains("h264_stub_hw"));
    assert!(calls[1].contains("-start_number 0") && calls[1].contains(SOFTWARE_ENCODER));
    assert!(calls[1].contains("frame_%05d.jpg"));
}

#[cfg(unix)]
#[test]
fn failure_on_both_attempts_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let (result, calls, scratch_root) = stub_run(dir.path(), &out, false, false, None, |_| {});

    let err = result.unwrap_err();
    assert!(matches!(err, TileslideError::Encode(_)));
    assert!(err.to_string().contains("stub failure"));
    assert_eq!(calls.len(), 2);
    assert!(!out.exists());
    assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);
}

#[cfg(unix)]
#[test]
fn software_sequence_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let (result, calls, _scratch_root) = stub_run(dir.path(), &out, true, false, None, |c| {
        c.use_streaming_encode = false;
    });

    assert!(matches!(result, Err(TileslideError::Encode(_))));
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].contains("pipe:0"));
    assert!(!out.exists());
}

#[cfg(unix)]
#[test]
fn hardware_sequence_failure_retries_with_software() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let (stub, log) = stub_ffmpeg(dir.path(), true, true);
    // Fails only when the hardware codec is named.
    let script = std::fs::read_to_string(&stub).unwrap().replacen(
        "case \"$*\" in\n",
        "case \"$*\" in\n*h264_stub_hw*) printf partial > \"$out\"; exit 1 ;;\n",
        1,
    );
    std::fs::write(&stub, script).unwrap();

    let src = write_image(dir.path(), "image_01.png", [0, 120, 0]);
    let mut c = cfg(&out);
    c.ffmpeg_path = stub.clone();
    c.use_streaming_encode = false;
    let mut encoders = EncoderCapabilities::software_only(&stub);
    encoders.usable_hardware = Some("h264_stub_hw".to_string());
    let caps = Capabilities::new(Arc::new(CpuResizer), encoders);

    let report = pipeline(c, caps).run(&[src]).unwrap();
    assert!(report.fallback_used);
    assert_eq!(report.encoder, SOFTWARE_ENCODER);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "video");
    assert_eq!(stub_calls(&log).len(), 2);
}

#[cfg(unix)]
#[test]
fn full_shared_memory_sends_sequence_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let (stub, _log) = stub_ffmpeg(dir.path(), true, true);
    let src = write_image(dir.path(), "image_01.png", [10, 20, 30]);

    let mut c = cfg(&out);
    c.ffmpeg_path = stub.clone();
    c.use_streaming_encode = false;
    c.use_ram_scratch = true;
    let caps = Capabilities::new(
        Arc::new(CpuResizer),
        EncoderCapabilities::software_only(&stub),
    );
    let shm = tempfile::tempdir().unwrap();
    let disk = tempfile::tempdir().unwrap();
    let scratch = ScratchManager::new(Arc::new(SmallShmHost), true)
        .with_shm_root(shm.path())
        .with_disk_root(disk.path());

    let report = pipeline(c, caps)
        .with_host(Arc::new(SmallShmHost))
        .with_scratch(scratch)
        .run(&[src])
        .unwrap();
    assert_eq!(report.scratch, Some(crate::scratch::ScratchKind::Disk));
    assert!(!report.fallback_used);
    assert_eq!(std::fs::read_dir(shm.path()).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(disk.path()).unwrap().count(), 0);
}
