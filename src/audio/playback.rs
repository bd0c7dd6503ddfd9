use std::path::Path;

/// Best-effort playback of the source audio while transcription runs.
///
/// Failures stay inside the implementation; the session controller never
/// observes them and never lets playback affect the pipeline outcome.
pub trait AudioPlayback: Send + Sync {
    fn play(&self, path: &Path);
    fn stop(&self);
}

/// Default playback sink: does nothing. Desktop hosts wire in a real one.
pub struct NullPlayback;

impl AudioPlayback for NullPlayback {
    fn play(&self, _path: &Path) {}
    fn stop(&self) {}
}
