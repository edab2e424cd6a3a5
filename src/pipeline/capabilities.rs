use std::sync::Arc;
use std::time::Duration;

use crate::assets::{ResizeProvider, negotiate_resizer};
use crate::config::PipelineConfig;
use crate::encode::{EncoderCapabilities, probe_encoders};

/// Optional accelerations negotiated once per run.
#[derive(Clone)]
pub struct Capabilities {
    /// Resize provider for tile preprocessing.
    pub resizer: Arc<dyn ResizeProvider>,
    /// What the local `ffmpeg` offers.
    pub encoders: EncoderCapabilities,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("resizer", &self.resizer.name())
            .field("encoders", &self.encoders)
            .finish()
    }
}

impl Capabilities {
    /// Probe the host according to `cfg`.
    pub fn probe(cfg: &PipelineConfig) -> Self {
        let _span = tracing::info_span!("probe_capabilities").entered();
        Self {
            resizer: negotiate_resizer(cfg.use_gpu),
            encoders: probe_encoders(
                &cfg.ffmpeg_path,
                Duration::from_secs(cfg.probe_timeout_secs),
            ),
        }
    }

    /// Build from already known parts.
    pub fn new(resizer: Arc<dyn ResizeProvider>, encoders: EncoderCapabilities) -> Self {
        Self { resizer, encoders }
    }

    /// One-line summary for logs and the `report` command.
    pub fn summary(&self) -> String {
        format!(
            "resize={} ffmpeg={} hardware_listed=[{}] hardware_usable={}",
            self.resizer.name(),
            if self.encoders.ffmpeg_available { "yes" } else { "no" },
            self.encoders.listed_hardware.join(","),
            self.encoders.usable_hardware.as_deref().unwrap_or("none"),
        )
    }
}
