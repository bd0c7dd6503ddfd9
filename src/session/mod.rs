//! Transcription session lifecycle
//!
//! One `SessionController` per loaded model. It sequences file
//! transcription, microphone recording, and benchmarks against a single
//! busy gate, reports outcomes through one completion callback, and
//! publishes state snapshots for renderers.

mod controller;
mod state;

pub use controller::{Capabilities, CompletionCallback, SessionController};
pub use state::{SessionSnapshot, SessionState};
