pub mod capture;
pub mod codec;
pub mod playback;

pub use capture::{AudioCapture, AudioFrame, CaptureErrorHandler, FrameCapture};
pub use codec::{AudioCodec, SymphoniaCodec, TARGET_SAMPLE_RATE};
pub use playback::{AudioPlayback, NullPlayback};
