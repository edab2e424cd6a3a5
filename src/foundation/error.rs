use std::path::PathBuf;

/// Convenience result type used across tileslide.
pub type TileslideResult<T> = Result<T, TileslideError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum TileslideError {
    /// Invalid user-provided configuration or arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// One source image could not be turned into a tile.
    #[error("preprocess error: '{}': {reason}", path.display())]
    Preprocess {
        /// Source image that failed.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// No usable tiles survived preprocessing.
    #[error("insufficient input: {0}")]
    InsufficientInput(String),

    /// A host capability query failed or timed out.
    #[error("capability probe error: {0}")]
    CapabilityProbe(String),

    /// The external encoder failed (spawn, broken pipe, non-zero exit).
    #[error("encode error: {0}")]
    Encode(String),

    /// Scratch storage could not be set up or torn down.
    #[error("resource acquisition error: {0}")]
    ResourceAcquisition(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TileslideError {
    /// Build a [`TileslideError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`TileslideError::Preprocess`] value.
    pub fn preprocess(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Preprocess {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`TileslideError::InsufficientInput`] value.
    pub fn insufficient_input(msg: impl Into<String>) -> Self {
        Self::InsufficientInput(msg.into())
    }

    /// Build a [`TileslideError::CapabilityProbe`] value.
    pub fn capability_probe(msg: impl Into<String>) -> Self {
        Self::CapabilityProbe(msg.into())
    }

    /// Build a [`TileslideError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`TileslideError::ResourceAcquisition`] value.
    pub fn resource_acquisition(msg: impl Into<String>) -> Self {
        Self::ResourceAcquisition(msg.into())
    }

    /// Return `true` when the run can continue past this error.
    ///
    /// Per-image preprocessing failures, failed capability probes and scratch setup failures
    /// are absorbed by the pipeline; everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Preprocess { .. } | Self::CapabilityProbe(_) | Self::ResourceAcquisition(_)
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
