use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::SessionError;

/// One block of PCM from the capture source (16-bit, interleaved).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Invoked when a capture fails after `start` has already returned.
pub type CaptureErrorHandler = Arc<dyn Fn(SessionError) + Send + Sync>;

/// Records audio to a file until stopped.
///
/// `start` must return quickly; failures that happen afterwards are reported
/// through the error handler. `stop` finalizes the recording and hands back
/// the file, or `None` when nothing was captured (including the case where
/// the error handler already fired).
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    async fn start(
        &self,
        target: &Path,
        on_error: CaptureErrorHandler,
    ) -> Result<(), SessionError>;

    async fn stop(&self) -> Result<Option<PathBuf>, SessionError>;
}

struct ActiveCapture {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<(Option<PathBuf>, mpsc::Receiver<AudioFrame>)>,
}

/// Capture implementation fed by an in-process frame channel.
///
/// The microphone itself is a host concern: whatever driver the host runs
/// pushes `AudioFrame`s into the channel, and this side drains them into a
/// WAV file between `start` and `stop`. The source is handed back on stop,
/// so one `FrameCapture` serves any number of consecutive recordings.
pub struct FrameCapture {
    source: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    active: Mutex<Option<ActiveCapture>>,
}

impl FrameCapture {
    pub fn new(source: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            source: Mutex::new(Some(source)),
            active: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl AudioCapture for FrameCapture {
    async fn start(
        &self,
        target: &Path,
        on_error: CaptureErrorHandler,
    ) -> Result<(), SessionError> {
        let mut rx = self
            .source
            .lock()
            .await
            .take()
            .ok_or_else(|| SessionError::Capture("capture is already running".to_string()))?;

        let target = target.to_path_buf();
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            // The WAV spec comes from the first frame; hound fixes the format
            // at creation time.
            let mut writer: Option<hound::WavWriter<BufWriter<File>>> = None;
            let mut written = 0usize;
            let mut failed = false;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    frame = rx.recv() => {
                        let Some(frame) = frame else { break };
                        if failed {
                            continue;
                        }

                        if writer.is_none() {
                            let spec = hound::WavSpec {
                                channels: frame.channels,
                                sample_rate: frame.sample_rate,
                                bits_per_sample: 16,
                                sample_format: hound::SampleFormat::Int,
                            };
                            match hound::WavWriter::create(&target, spec) {
                                Ok(w) => writer = Some(w),
                                Err(e) => {
                                    on_error(SessionError::Capture(format!(
                                        "failed to create {}: {e}",
                                        target.display()
                                    )));
                                    failed = true;
                                    continue;
                                }
                            }
                        }

                        if let Some(w) = writer.as_mut() {
                            for &sample in &frame.samples {
                                if let Err(e) = w.write_sample(sample) {
                                    on_error(SessionError::Capture(format!(
                                        "failed to write sample: {e}"
                                    )));
                                    failed = true;
                                    break;
                                }
                            }
                            written += frame.samples.len();
                        }
                    }
                }
            }

            let produced = match writer {
                Some(w) if !failed => match w.finalize() {
                    Ok(()) => {
                        info!("Recording finalized: {} samples to {}", written, target.display());
                        Some(target)
                    }
                    Err(e) => {
                        on_error(SessionError::Capture(format!(
                            "failed to finalize recording: {e}"
                        )));
                        None
                    }
                },
                _ => None,
            };

            (produced, rx)
        });

        self.active
            .lock()
            .await
            .replace(ActiveCapture { stop_tx, handle });

        Ok(())
    }

    async fn stop(&self) -> Result<Option<PathBuf>, SessionError> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(None);
        };

        // The writer task may already be gone (source channel closed); the
        // send result is irrelevant either way.
        let _ = active.stop_tx.send(());

        let (produced, rx) = active
            .handle
            .await
            .map_err(|e| SessionError::Capture(format!("capture task panicked: {e}")))?;

        self.source.lock().await.replace(rx);

        Ok(produced)
    }
}
