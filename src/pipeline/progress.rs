use std::sync::mpsc::Sender;

/// Pipeline stage a progress event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Decoding and cropping source images.
    Preprocess,
    /// Rendering frames and handing them to the sink.
    Render,
    /// Waiting for the encoder to finish.
    Encode,
}

/// Completion of one stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Stage.
    pub stage: Stage,
    /// Units finished.
    pub done: u64,
    /// Units in the stage.
    pub total: u64,
}

impl ProgressEvent {
    /// Percent complete (100 for an empty stage).
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.done.min(self.total) as f64) * 100.0 / (self.total as f64)
    }
}

/// Optional channel progress events are sent to. A dropped receiver is ignored.
#[derive(Clone, Debug, Default)]
pub(crate) struct Progress {
    tx: Option<Sender<ProgressEvent>>,
}

impl Progress {
    pub(crate) fn new(tx: Option<Sender<ProgressEvent>>) -> Self {
        Self { tx }
    }

    pub(crate) fn emit(&self, stage: Stage, done: u64, total: u64) {
        let event = ProgressEvent { stage, done, total };
        tracing::trace!(?stage, done, total, "progress");
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
