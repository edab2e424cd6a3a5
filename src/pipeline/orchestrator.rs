use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use crate::assets::{ResizeProvider, Tile, TileSpec, preprocess};
use crate::config::{FrameFormat, PipelineConfig};
use crate::encode::session::ensure_parent_dir;
use crate::encode::{
    EncoderSession, EncoderSettings, FrameSink, SOFTWARE_ENCODER, SequenceSink, SinkConfig,
};
use crate::foundation::core::{FrameIndex, Size};
use crate::foundation::error::{TileslideError, TileslideResult};
use crate::host::{HostProbe, HostReport, SystemHost, resolve_worker_count};
use crate::layout::layout;
use crate::pool::{BatchOpts, DEFAULT_PRESSURE_PAUSE, WorkerPool};
use crate::render::FrameRenderer;
use crate::scratch::{ScratchKind, ScratchManager};

use super::capabilities::Capabilities;
use super::progress::{Progress, ProgressEvent, Stage};

/// How frames reached the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Raw frames piped to `ffmpeg` stdin.
    Streaming,
    /// Numbered image files encoded afterwards.
    Sequence,
}

/// Summary of a successful run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunReport {
    /// Video written.
    pub output_path: PathBuf,
    /// Tiles placed in the grid.
    pub tiles_used: usize,
    /// Sources that failed preprocessing.
    pub tiles_failed: usize,
    /// Preprocessed tiles beyond the grid capacity.
    pub tiles_dropped: usize,
    /// Frames encoded.
    pub frame_count: u64,
    /// Output frame size.
    pub frame_size: Size,
    /// Grid frame size.
    pub grid_size: Size,
    /// Codec that produced the output.
    pub encoder: String,
    /// Input mode of the successful encode.
    pub input_mode: InputMode,
    /// Whether the fallback encode ran.
    pub fallback_used: bool,
    /// Scratch storage used by a sequence encode.
    pub scratch: Option<ScratchKind>,
    /// Worker count.
    pub workers: usize,
    /// Resize provider.
    pub resizer: String,
}

/// Tiles that survived preprocessing, in source order.
#[derive(Debug)]
pub struct PreprocessOutcome {
    /// Usable tiles.
    pub tiles: Vec<Tile>,
    /// Number of failed sources.
    pub failed: usize,
}

struct Attempt {
    encoder: String,
    mode: InputMode,
    scratch: Option<ScratchKind>,
}

/// Runs preprocessing, rendering and encoding for one [`PipelineConfig`].
pub struct Pipeline {
    cfg: PipelineConfig,
    host: Arc<dyn HostProbe>,
    caps: Option<Capabilities>,
    scratch: Option<ScratchManager>,
    progress: Progress,
    pressure_pause: Duration,
}

impl Pipeline {
    /// Validate `cfg` and create a pipeline for the running host.
    pub fn new(cfg: PipelineConfig) -> TileslideResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            host: Arc::new(SystemHost::new()),
            caps: None,
            scratch: None,
            progress: Progress::default(),
            pressure_pause: DEFAULT_PRESSURE_PAUSE,
        })
    }

    /// Use a different host probe.
    pub fn with_host(mut self, host: Arc<dyn HostProbe>) -> Self {
        self.host = host;
        self
    }

    /// Use already negotiated capabilities instead of probing.
    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = Some(caps);
        self
    }

    /// Use a specific scratch manager for sequence encodes.
    pub fn with_scratch(mut self, scratch: ScratchManager) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Send progress events to `tx`.
    pub fn with_progress(mut self, tx: Sender<ProgressEvent>) -> Self {
        self.progress = Progress::new(Some(tx));
        self
    }

    /// Override the memory-pressure back-off of the worker pool.
    pub fn with_pressure_pause(mut self, pause: Duration) -> Self {
        self.pressure_pause = pause;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Capabilities, probed on first use and cached afterwards.
    pub fn capabilities(&mut self) -> &Capabilities {
        self.caps.get_or_insert_with(|| Capabilities::probe(&self.cfg))
    }

    /// Worker pool sized from the config and host.
    pub fn build_pool(&self) -> TileslideResult<WorkerPool> {
        let workers = if self.cfg.use_parallel {
            resolve_worker_count(self.cfg.worker_count, self.host.as_ref())
        } else {
            1
        };
        Ok(WorkerPool::new(workers, self.host.clone())?.with_pressure_pause(self.pressure_pause))
    }

    fn batch_opts(&self, io_bound: bool) -> BatchOpts {
        BatchOpts {
            io_bound,
            batch_size: self.cfg.batch_size,
            memory_threshold_pct: self.cfg.memory_threshold_pct,
        }
    }

    /// Preprocess `sources` into tiles, keeping source order.
    ///
    /// Failed sources are logged and skipped. Fails only when no tile survives.
    pub fn preprocess_tiles(
        &self,
        sources: &[PathBuf],
        pool: &WorkerPool,
        resizer: &dyn ResizeProvider,
    ) -> TileslideResult<PreprocessOutcome> {
        let _span = tracing::info_span!("preprocess", sources = sources.len()).entered();
        let spec = TileSpec::from_config(&self.cfg);
        // With the resize on the GPU the workers mostly wait on file reads and readback.
        let io_bound = resizer.name() != "cpu";

        let outcome = pool.run_batch(
            sources,
            |path: &PathBuf| preprocess(path, &spec, resizer),
            &self.batch_opts(io_bound),
        );
        for event in &outcome.events {
            self.progress
                .emit(Stage::Preprocess, event.done as u64, event.total as u64);
        }
        for failure in &outcome.failures {
            tracing::warn!(
                source = %sources[failure.index].display(),
                error = %failure.message,
                "skipping source image"
            );
        }

        let tiles: Vec<Tile> = outcome.results.into_iter().flatten().collect();
        tracing::info!(ok = tiles.len(), failed = outcome.failed, "preprocessing done");
        if tiles.is_empty() {
            return Err(TileslideError::insufficient_input(format!(
                "none of {} source images could be used",
                sources.len()
            )));
        }
        Ok(PreprocessOutcome {
            tiles,
            failed: outcome.failed,
        })
    }

    /// Grid layout and renderer for `tiles`.
    pub fn build_renderer(&self, tiles: Vec<Tile>) -> TileslideResult<FrameRenderer> {
        let first = tiles
            .first()
            .ok_or_else(|| TileslideError::insufficient_input("no tiles to lay out"))?;
        let grid = layout(
            first.width,
            first.height,
            self.cfg.grid_rows,
            self.cfg.grid_cols,
            self.cfg.gap_horizontal,
            self.cfg.gap_vertical,
        );
        FrameRenderer::new(&self.cfg, grid, tiles)
    }

    /// Render every frame and push it to `sink` in index order.
    ///
    /// Frames are rendered in chunks of `batch_size` on the pool; only one chunk is alive at a
    /// time. Returns the number of frames pushed.
    pub fn render_to_sink(
        &self,
        renderer: &FrameRenderer,
        pool: &WorkerPool,
        sink: &mut dyn FrameSink,
    ) -> TileslideResult<u64> {
        let total = self.cfg.frame_count();
        let size = renderer.size();
        sink.begin(SinkConfig {
            width: size.width,
            height: size.height,
            fps: self.cfg.fps,
            frame_count: total,
        })?;

        let chunk = self.cfg.batch_size.max(1) as u64;
        let opts = self.batch_opts(false);
        let mut start = 0;
        while start < total {
            let end = (start + chunk).min(total);
            let indices: Vec<FrameIndex> = (start..end).map(FrameIndex).collect();
            let outcome = pool.run_batch(&indices, |idx| Ok(renderer.render(*idx)), &opts);
            if let Some(failure) = outcome.failures.first() {
                return Err(anyhow::anyhow!(
                    "frame {} failed to render: {}",
                    indices[failure.index].0,
                    failure.message
                )
                .into());
            }
            for (idx, frame) in indices.iter().zip(outcome.results.into_iter().flatten()) {
                sink.push_frame(*idx, &frame)?;
            }
            self.progress.emit(Stage::Render, end, total);
            start = end;
        }

        sink.end()?;
        Ok(total)
    }

    /// Run the whole pipeline on `sources` (ordered; excess beyond the grid is dropped).
    pub fn run(&mut self, sources: &[PathBuf]) -> TileslideResult<RunReport> {
        let output = self.cfg.output_path.clone();
        let _span = tracing::info_span!("pipeline", output = %output.display()).entered();

        HostReport::gather(self.host.as_ref(), self.cfg.worker_count).log();
        let caps = self.capabilities().clone();
        tracing::info!(capabilities = %caps.summary(), "capabilities negotiated");
        if !caps.encoders.ffmpeg_available {
            return Err(TileslideError::encode(format!(
                "ffmpeg is required but '{}' could not be run",
                self.cfg.ffmpeg_path.display()
            )));
        }

        let pool = self.build_pool()?;
        let pre = self.preprocess_tiles(sources, &pool, caps.resizer.as_ref())?;
        let tiles_total = pre.tiles.len();
        let renderer = self.build_renderer(pre.tiles)?;
        if tiles_total > renderer.tile_count() {
            tracing::info!(
                dropped = tiles_total - renderer.tile_count(),
                capacity = renderer.layout().capacity(),
                "more tiles than grid cells, extra tiles are not rendered"
            );
        }

        ensure_parent_dir(&output)?;

        let settings = EncoderSettings::from_config(&self.cfg);
        let primary = if self.cfg.use_streaming_encode {
            InputMode::Streaming
        } else {
            InputMode::Sequence
        };
        let primary_is_last_resort = primary == InputMode::Sequence
            && caps.encoders.select(settings.prefer_hardware) == SOFTWARE_ENCODER;

        let (attempt, fallback_used) =
            match self.encode(&renderer, &pool, &caps, primary, settings.clone()) {
                Ok(a) => (a, false),
                Err(e @ TileslideError::Encode(_)) if !primary_is_last_resort => {
                    tracing::warn!(
                        error = %e,
                        "encode failed, retrying once as an image sequence with the software encoder"
                    );
                    remove_partial_output(&output);
                    let software = EncoderSettings {
                        prefer_hardware: false,
                        ..settings
                    };
                    match self.encode(&renderer, &pool, &caps, InputMode::Sequence, software) {
                        Ok(a) => (a, true),
                        Err(e) => {
                            remove_partial_output(&output);
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    remove_partial_output(&output);
                    return Err(e);
                }
            };

        let report = RunReport {
            output_path: output,
            tiles_used: renderer.tile_count(),
            tiles_failed: pre.failed,
            tiles_dropped: tiles_total - renderer.tile_count(),
            frame_count: self.cfg.frame_count(),
            frame_size: renderer.size(),
            grid_size: renderer.layout().frame_size(),
            encoder: attempt.encoder,
            input_mode: attempt.mode,
            fallback_used,
            scratch: attempt.scratch,
            workers: pool.workers(),
            resizer: caps.resizer.name().to_string(),
        };
        tracing::info!(
            output = %report.output_path.display(),
            frames = report.frame_count,
            width = report.frame_size.width,
            height = report.frame_size.height,
            encoder = %report.encoder,
            mode = ?report.input_mode,
            fallback = report.fallback_used,
            "video written"
        );
        Ok(report)
    }

    fn encode(
        &self,
        renderer: &FrameRenderer,
        pool: &WorkerPool,
        caps: &Capabilities,
        mode: InputMode,
        settings: EncoderSettings,
    ) -> TileslideResult<Attempt> {
        let _span = tracing::info_span!("encode", ?mode).entered();
        let mut session = EncoderSession::new(settings);
        let encoder = session.negotiate(&caps.encoders)?.to_string();

        let scratch = match mode {
            InputMode::Streaming => {
                self.render_to_sink(renderer, pool, &mut session)?;
                None
            }
            InputMode::Sequence => {
                let owned;
                let manager = match &self.scratch {
                    Some(m) => m,
                    None => {
                        owned = ScratchManager::new(self.host.clone(), self.cfg.use_ram_scratch);
                        &owned
                    }
                };
                let (space, pattern) =
                    manager.acquire_with(self.sequence_bytes(renderer.size()), |dir| {
                        let mut sink =
                            SequenceSink::new(dir, self.cfg.frame_format, self.cfg.frame_quality);
                        self.render_to_sink(renderer, pool, &mut sink)?;
                        Ok(sink.pattern())
                    })?;
                self.progress.emit(Stage::Encode, 0, 1);
                session.encode_sequence(&pattern, self.cfg.fps)?;
                let kind = space.kind();
                if let Err(e) = space.release() {
                    tracing::warn!(error = %e, "scratch release failed");
                }
                Some(kind)
            }
        };
        self.progress.emit(Stage::Encode, 1, 1);
        Ok(Attempt {
            encoder,
            mode,
            scratch,
        })
    }

    /// Rough size of all intermediate frame files.
    fn sequence_bytes(&self, size: Size) -> u64 {
        let raw = size.rgb_len() as u64;
        let per_frame = match self.cfg.frame_format {
            FrameFormat::Png => raw,
            FrameFormat::Jpeg => raw / 8,
        };
        per_frame.saturating_mul(self.cfg.frame_count())
    }
}

fn remove_partial_output(path: &Path) {
    if path.exists()
        && let Err(e) = std::fs::remove_file(path)
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove partial output");
    }
}
