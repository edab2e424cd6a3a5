//! Frame sinks and the `ffmpeg` encoder session.
//!
//! Sinks consume rendered frames in index order. [`EncoderSession`] streams raw RGB24 into a
//! system `ffmpeg` process; [`SequenceSink`] writes numbered images that an encoder session
//! later turns into a video.

/// `ffmpeg` capability probing.
pub mod probe;
/// Numbered still-image sink.
pub mod sequence;
/// `ffmpeg` encoder session.
pub mod session;
/// Frame sink trait and the in-memory sink.
pub mod sink;

pub use probe::{
    EncoderCapabilities, HARDWARE_ENCODERS, SOFTWARE_ENCODER, parse_encoder_list, probe_encoders,
    run_with_timeout,
};
pub use sequence::SequenceSink;
pub use session::{
    CloseStatus, EncoderInput, EncoderSession, EncoderSettings, SessionState, build_command,
};
pub use sink::{FrameSink, InMemorySink, SinkConfig};

#[cfg(test)]
#[path = "../../tests/unit/encode.rs"]
mod tests;
