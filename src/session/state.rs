use serde::Serialize;

/// Lifecycle of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Constructed, model not yet requested.
    Idle,
    /// Resolving and loading the model.
    LoadingModel,
    /// Model loaded, no operation in flight.
    Ready,
    /// Microphone capture is active.
    Recording,
    /// The decode → inference → persist pipeline is running.
    Transcribing,
    /// Engine benchmarks are running.
    Benchmarking,
    /// Model load failed; the session is only usable for retried loads.
    Failed(String),
}

/// What a renderer observes. A fresh snapshot is published on every state
/// transition through the controller's watch channel, replacing the previous
/// one atomically.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub busy: bool,
    pub recording: bool,
    pub model_loaded: bool,
}

impl SessionSnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            state: SessionState::Idle,
            busy: false,
            recording: false,
            model_loaded: false,
        }
    }
}
