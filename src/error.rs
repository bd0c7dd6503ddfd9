use thiserror::Error;

/// What a resolver was asked to locate. Only affects log and error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Model,
    Sample,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Model => write!(f, "model"),
            ResourceKind::Sample => write!(f, "sample"),
        }
    }
}

/// Failure taxonomy for the transcription session.
///
/// Everything except `Persistence` aborts the operation it occurred in and is
/// surfaced to the host through the completion callback as an `"ERROR: "`
/// string. A persistence failure is logged only; the callback still carries
/// the transcription outcome (see `Settings::strict_persistence` to opt out
/// of that behavior).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no {kind} found (searched {searched})")]
    ResourceNotFound { kind: ResourceKind, searched: String },

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("audio capture failed: {0}")]
    Capture(String),

    #[error("failed to persist transcript: {0}")]
    Persistence(#[from] std::io::Error),
}
