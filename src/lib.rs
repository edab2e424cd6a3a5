//! Tileslide renders a grid of cropped still images sliding across a fixed frame and encodes
//! the result to an H.264 MP4 with `ffmpeg`.
//!
//! - Build and validate a [`config::PipelineConfig`]
//! - Create a [`pipeline::Pipeline`] and [`pipeline::Pipeline::run`] it on ordered sources
//! - Or drive the pieces directly: [`assets::preprocess`], [`layout::layout`],
//!   [`render::FrameRenderer`] and any [`encode::FrameSink`]
#![forbid(unsafe_code)]

mod foundation;

/// Tile preprocessing: decode, crop, resize.
pub mod assets;
/// Sliding-offset timeline.
pub mod animation;
/// Pipeline configuration and overrides.
pub mod config;
/// Frame sinks and the `ffmpeg` encoder session.
pub mod encode;
/// Host CPU, memory and platform queries.
pub mod host;
/// Grid geometry.
pub mod layout;
/// End-to-end pipeline.
pub mod pipeline;
/// Batched worker pool with memory back-off.
pub mod pool;
/// Frame composition.
pub mod render;
/// RAM-backed or disk scratch directories.
pub mod scratch;

pub use crate::foundation::core::{FrameIndex, Rgb8, Size};
pub use crate::foundation::error::{TileslideError, TileslideResult};

pub use crate::config::PipelineConfig;
pub use crate::encode::{FrameSink, InMemorySink, SinkConfig};
pub use crate::pipeline::{Pipeline, RunReport};
pub use crate::render::RenderFrame;
