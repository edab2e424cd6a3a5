//! End-to-end run: sources to tiles, tiles to frames, frames to video.
//!
//! [`Pipeline::run`] probes capabilities once, preprocesses sources on the worker pool, renders
//! frames in order and hands them to the encoder. A failed encode is retried exactly once as an
//! image sequence with the software encoder.

mod capabilities;
mod orchestrator;
mod progress;
mod sources;

pub use capabilities::Capabilities;
pub use orchestrator::{InputMode, Pipeline, PreprocessOutcome, RunReport};
pub use progress::{ProgressEvent, Stage};
pub use sources::discover_sources;

#[cfg(test)]
#[path = "../../tests/unit/pipeline.rs"]
mod tests;
