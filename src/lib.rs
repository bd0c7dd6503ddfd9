pub mod audio;
pub mod config;
pub mod debug_log;
pub mod engine;
pub mod error;
pub mod resolve;
pub mod session;

pub use audio::{
    AudioCapture, AudioCodec, AudioFrame, AudioPlayback, CaptureErrorHandler, FrameCapture,
    NullPlayback, SymphoniaCodec, TARGET_SAMPLE_RATE,
};
pub use config::Settings;
pub use debug_log::DebugLog;
pub use engine::{BenchmarkStats, InferenceEngine, ModelHandle, TranscribeOptions};
pub use error::{ResourceKind, SessionError};
pub use session::{
    Capabilities, CompletionCallback, SessionController, SessionSnapshot, SessionState,
};
