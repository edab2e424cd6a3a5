//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is assembled once by the caller from defaults, an optional JSON file and
//! a flat `KEY=value` override map (the same keys are read from the process environment),
//! validated, and then handed to every stage by reference.

mod color;
mod overrides;
mod types;
mod validate;

pub use color::parse_background_color;
pub use overrides::OVERRIDE_KEYS;
pub use types::{CropAnchor, FrameFormat, FrameSizePolicy, PipelineConfig};
pub use validate::MAX_GAP;

use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{TileslideError, TileslideResult};

impl PipelineConfig {
    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn load_json(path: &Path) -> TileslideResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        serde_json::from_str(&text).map_err(|e| {
            TileslideError::validation(format!("parse config '{}': {e}", path.display()))
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/mod.rs"]
mod tests;
