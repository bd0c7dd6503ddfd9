use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::audio::{AudioCapture, AudioCodec, AudioPlayback, CaptureErrorHandler};
use crate::config::Settings;
use crate::debug_log::DebugLog;
use crate::engine::{InferenceEngine, ModelHandle, TranscribeOptions};
use crate::error::{ResourceKind, SessionError};
use crate::resolve;
use crate::session::state::{SessionSnapshot, SessionState};

/// The single notification channel back to the hosting application: the
/// transcript text on success, or a string starting with `"ERROR: "` on
/// failure. Invoked at most once per requested operation.
pub type CompletionCallback = Arc<dyn Fn(String) + Send + Sync>;

/// The capabilities the controller drives. Everything heavy sits behind
/// these seams, so tests run without real audio or inference.
pub struct Capabilities {
    pub engine: Arc<dyn InferenceEngine>,
    pub codec: Arc<dyn AudioCodec>,
    pub capture: Arc<dyn AudioCapture>,
    pub playback: Arc<dyn AudioPlayback>,
}

struct Inner {
    state: SessionState,
    model: Option<ModelHandle>,
    active_recording: Option<PathBuf>,
}

/// State every operation touches, behind one `Arc` so the asynchronous
/// capture error path can reach it from outside a controller method.
struct Shared {
    caps: Capabilities,
    log: Arc<DebugLog>,
    on_complete: CompletionCallback,
    busy: AtomicBool,
    recording: AtomicBool,
    defunct: AtomicBool,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionSnapshot>,
}

/// Owns the model handle and sequences every operation against it.
///
/// All mutations happen on one logical timeline: public methods are async
/// and fold blocking work (decode, inference, model load) back through
/// `spawn_blocking` before touching shared state. The busy gate is a
/// single-slot compare-and-set; a request arriving while another operation
/// is in flight is logged and dropped, never queued.
pub struct SessionController {
    settings: Settings,
    shared: Arc<Shared>,
}

/// Clears the busy gate when dropped, so every exit path of an operation
/// releases it exactly once.
struct BusyGuard<'a> {
    shared: &'a Shared,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.shared.busy.store(false, Ordering::SeqCst);
    }
}

impl SessionController {
    /// Build a session in `Idle`. Call `load_model` to bring it to `Ready`.
    pub fn new(settings: Settings, caps: Capabilities, on_complete: CompletionCallback) -> Self {
        let log = Arc::new(DebugLog::init(settings.debug_log_path.as_deref()));
        let (state_tx, _) = watch::channel(SessionSnapshot::initial());

        Self {
            settings,
            shared: Arc::new(Shared {
                caps,
                log,
                on_complete,
                busy: AtomicBool::new(false),
                recording: AtomicBool::new(false),
                defunct: AtomicBool::new(false),
                inner: Mutex::new(Inner {
                    state: SessionState::Idle,
                    model: None,
                    active_recording: None,
                }),
                state_tx,
            }),
        }
    }

    /// Observe state transitions. Each transition replaces the snapshot
    /// atomically, so a renderer never sees a torn update.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.state_tx.subscribe()
    }

    pub fn debug_log(&self) -> Arc<DebugLog> {
        Arc::clone(&self.shared.log)
    }

    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> SessionState {
        self.shared.inner.lock().await.state.clone()
    }

    /// Resolve and load the model.
    ///
    /// On failure the session lands in `Failed` with no handle and the busy
    /// flag untouched; the host may call again to retry. A reload releases
    /// the previous handle first, so the handle is freed exactly once.
    pub async fn load_model(&self) -> Result<(), SessionError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        if let Some(handle) = inner.model.take() {
            shared.log.write("Releasing previously loaded model");
            shared.caps.engine.release(handle);
        }

        shared.set_state(&mut inner, SessionState::LoadingModel);
        shared
            .log
            .write(&format!("System info: {}", shared.caps.engine.system_info()));

        let path = match resolve::resolve(
            self.settings.model_path.as_deref(),
            &self.settings.models_dir,
            ResourceKind::Model,
            &shared.log,
        ) {
            Ok(path) => path,
            Err(err) => {
                shared.log.write(&format!("Model load failed: {err}"));
                shared.set_state(&mut inner, SessionState::Failed(err.to_string()));
                return Err(err);
            }
        };

        let engine = Arc::clone(&shared.caps.engine);
        let load_path = path.clone();
        let loaded = flatten(
            tokio::task::spawn_blocking(move || engine.load(&load_path)).await,
        );

        match loaded {
            Ok(handle) => {
                inner.model = Some(handle);
                shared
                    .log
                    .write(&format!("Model loaded successfully: {}", path.display()));
                shared.set_state(&mut inner, SessionState::Ready);
                Ok(())
            }
            Err(err) => {
                shared.log.write(&format!("Model load failed: {err}"));
                shared.set_state(&mut inner, SessionState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Transcribe the configured sample file (explicit path, or the first
    /// file in the samples directory). A request while another operation is
    /// in flight is logged and dropped without a callback.
    pub async fn transcribe_sample(&self) {
        let Some(busy) = self.shared.try_acquire_busy("transcription") else {
            return;
        };

        let source = match resolve::resolve(
            self.settings.sample_path.as_deref(),
            &self.settings.samples_dir,
            ResourceKind::Sample,
            &self.shared.log,
        ) {
            Ok(path) => path,
            Err(err) => {
                self.shared.log.write(&format!("Transcription failed: {err}"));
                self.shared.deliver(Err(err));
                return;
            }
        };

        self.run_pipeline(source, busy).await;
    }

    /// Start recording, or stop the active recording and transcribe what it
    /// captured.
    pub async fn toggle_recording(&self) {
        if self.shared.recording.load(Ordering::SeqCst) {
            self.stop_recording().await;
        } else {
            self.start_recording().await;
        }
    }

    /// Run the engine benchmarks under the busy gate. Results are written to
    /// the debug log only; the completion callback is not involved.
    pub async fn run_benchmark(&self, runs: usize) {
        let shared = &self.shared;
        let Some(_busy) = shared.try_acquire_busy("benchmark") else {
            return;
        };

        let handle = {
            let mut inner = shared.inner.lock().await;
            let Some(handle) = inner.model else {
                shared.log.write("Benchmark skipped: no model is loaded");
                return;
            };
            shared.set_state(&mut inner, SessionState::Benchmarking);
            handle
        };

        shared
            .log
            .write(&format!("System info: {}", shared.caps.engine.system_info()));

        let engine = Arc::clone(&shared.caps.engine);
        let mem = flatten(
            tokio::task::spawn_blocking(move || engine.benchmark_memory(handle, runs)).await,
        );
        match mem {
            Ok(stats) => shared.log.write(&format!("Memory benchmark: {stats}")),
            Err(err) => shared.log.write(&format!("Memory benchmark failed: {err}")),
        }

        let engine = Arc::clone(&shared.caps.engine);
        let mat = flatten(
            tokio::task::spawn_blocking(move || engine.benchmark_mat_mul(handle, runs)).await,
        );
        match mat {
            Ok(stats) => shared.log.write(&format!("MatMul benchmark: {stats}")),
            Err(err) => shared.log.write(&format!("MatMul benchmark failed: {err}")),
        }

        let mut inner = shared.inner.lock().await;
        shared.set_state(&mut inner, SessionState::Ready);
    }

    /// Tear the session down: stop playback, release the model handle, and
    /// silence any completions that arrive afterwards. Safe to call while an
    /// operation is mid-flight: the pending work finishes against its own
    /// references and its callback becomes a no-op.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        shared.defunct.store(true, Ordering::SeqCst);
        shared.caps.playback.stop();

        let mut inner = shared.inner.lock().await;
        if let Some(handle) = inner.model.take() {
            shared.caps.engine.release(handle);
            shared.log.write("Model released");
        }
        inner.state = SessionState::Idle;
        info!("Session torn down");
    }

    async fn start_recording(&self) {
        let shared = &self.shared;
        if shared.busy.load(Ordering::SeqCst) {
            shared
                .log
                .write("Ignoring record request: another operation is in flight");
            return;
        }

        if let Err(err) = std::fs::create_dir_all(&self.settings.recordings_dir) {
            let err = SessionError::Capture(format!(
                "cannot create {}: {err}",
                self.settings.recordings_dir.display()
            ));
            shared.log.write(&format!("Failed to start recording: {err}"));
            shared.deliver(Err(err));
            return;
        }

        let target = self
            .settings
            .recordings_dir
            .join(format!("rec-{}.wav", uuid::Uuid::new_v4()));

        match shared
            .caps
            .capture
            .start(&target, capture_error_handler(shared))
            .await
        {
            Ok(()) => {
                shared.recording.store(true, Ordering::SeqCst);
                let mut inner = shared.inner.lock().await;
                inner.active_recording = Some(target.clone());
                shared.set_state(&mut inner, SessionState::Recording);
                shared
                    .log
                    .write(&format!("Recording to {}", target.display()));
            }
            Err(err) => {
                shared.log.write(&format!("Failed to start recording: {err}"));
                shared.deliver(Err(err));
            }
        }
    }

    async fn stop_recording(&self) {
        let shared = &self.shared;
        shared.recording.store(false, Ordering::SeqCst);
        let stopped = shared.caps.capture.stop().await;
        shared.inner.lock().await.active_recording.take();

        match stopped {
            Ok(Some(path)) => {
                shared
                    .log
                    .write(&format!("Recording stopped: {}", path.display()));
                let Some(busy) = shared.try_acquire_busy("transcription") else {
                    // The file stays on disk but nothing picks it up. The
                    // operation holding the gate owns the state and restores
                    // `Ready` when it finishes.
                    shared.log.write(&format!(
                        "Discarding recording {}: another operation is in flight",
                        path.display()
                    ));
                    return;
                };
                self.run_pipeline(path, busy).await;
            }
            Ok(None) => {
                // Either nothing was captured, or the capture failed earlier
                // and its error handler already notified the host.
                shared.log.write("Recording stopped with no captured audio");
                let mut inner = shared.inner.lock().await;
                shared.set_state(&mut inner, SessionState::Ready);
            }
            Err(err) => {
                shared.log.write(&format!("Failed to stop recording: {err}"));
                shared.deliver(Err(err));
                let mut inner = shared.inner.lock().await;
                shared.set_state(&mut inner, SessionState::Ready);
            }
        }
    }

    /// The `Transcribing` state body. Owns the busy guard for the whole
    /// pipeline and delivers exactly one outcome.
    async fn run_pipeline(&self, source: PathBuf, busy: BusyGuard<'_>) {
        let shared = &self.shared;
        let handle = {
            let inner = shared.inner.lock().await;
            inner.model
        };
        let Some(handle) = handle else {
            let err = SessionError::Inference("no model is loaded".to_string());
            shared.log.write(&format!("Transcription failed: {err}"));
            shared.deliver(Err(err));
            return;
        };

        {
            let mut inner = shared.inner.lock().await;
            shared.set_state(&mut inner, SessionState::Transcribing);
        }

        let outcome = self.transcribe_file(&source, handle).await;
        match &outcome {
            Ok(_) => shared.log.write("Transcription finished"),
            Err(err) => shared.log.write(&format!("Transcription failed: {err}")),
        }

        shared.deliver(outcome);

        // Busy clears right after the callback, then the Ready snapshot goes
        // out with the gate already open.
        drop(busy);
        let mut inner = shared.inner.lock().await;
        shared.set_state(&mut inner, SessionState::Ready);
    }

    async fn transcribe_file(
        &self,
        source: &Path,
        handle: ModelHandle,
    ) -> Result<String, SessionError> {
        let shared = &self.shared;
        shared
            .log
            .write(&format!("Reading audio from {}", source.display()));
        let codec = Arc::clone(&shared.caps.codec);
        let decode_path = source.to_path_buf();
        let samples = flatten_with(
            tokio::task::spawn_blocking(move || codec.decode(&decode_path)).await,
            |e| SessionError::Decode(format!("decode task failed: {e}")),
        )?;
        shared
            .log
            .write(&format!("Decoded {} samples", samples.len()));

        // Best effort: a playback failure is invisible at this layer.
        shared.caps.playback.play(source);

        shared.log.write("Transcribing data...");
        let options = TranscribeOptions {
            emit_timestamps: self.settings.emit_timestamps,
            prompt: self.settings.prompt.clone(),
            language: self.settings.language.clone(),
            translate: self.settings.translate,
        };
        let engine = Arc::clone(&shared.caps.engine);
        let started = Instant::now();
        let text = flatten(
            tokio::task::spawn_blocking(move || engine.transcribe(handle, &samples, &options))
                .await,
        )?;

        if self.settings.emit_timestamps {
            shared.log.write(&format!(
                "Transcription completed in {} ms",
                started.elapsed().as_millis()
            ));
        }

        match self.persist(&text) {
            Ok(path) => shared
                .log
                .write(&format!("Transcript saved to {}", path.display())),
            Err(err) => {
                // Log-only by default: the callback reports the transcription
                // outcome, not the save outcome.
                shared.log.write(&format!("ERROR: {err}"));
                warn!("transcript not persisted: {err}");
                if self.settings.strict_persistence {
                    return Err(err);
                }
            }
        }

        Ok(text)
    }

    fn persist(&self, text: &str) -> Result<PathBuf, SessionError> {
        let path = &self.settings.output_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, text)?;
        Ok(path.clone())
    }
}

/// Handles a capture failure reported after `start` returned: log, clear the
/// recording flag, notify the host, then fold the capture teardown and the
/// `Ready` transition back onto the session timeline.
fn capture_error_handler(shared: &Arc<Shared>) -> CaptureErrorHandler {
    let shared = Arc::clone(shared);
    Arc::new(move |err: SessionError| {
        shared.log.write(&format!("Recording error: {err}"));
        shared.recording.store(false, Ordering::SeqCst);
        shared.deliver(Err(err));

        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            // Hand the capture source back so the next recording can start.
            if let Err(stop_err) = shared.caps.capture.stop().await {
                shared
                    .log
                    .write(&format!("Failed to stop recording: {stop_err}"));
            }
            let mut inner = shared.inner.lock().await;
            inner.active_recording = None;
            shared.set_state(&mut inner, SessionState::Ready);
        });
    })
}

impl Shared {
    fn try_acquire_busy(&self, what: &str) -> Option<BusyGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(BusyGuard { shared: self })
        } else {
            self.log
                .write(&format!("Ignoring {what} request: another operation is in flight"));
            None
        }
    }

    fn deliver(&self, outcome: Result<String, SessionError>) {
        if self.defunct.load(Ordering::SeqCst) {
            // The host tore the session down; late completions are dropped.
            return;
        }
        let message = match outcome {
            Ok(text) => text,
            Err(err) => format!("ERROR: {err}"),
        };
        (self.on_complete)(message);
    }

    fn set_state(&self, inner: &mut Inner, state: SessionState) {
        if self.defunct.load(Ordering::SeqCst) {
            // Shutdown pinned the state; in-flight operations no longer move it.
            return;
        }
        inner.state = state;
        self.state_tx.send_replace(SessionSnapshot {
            state: inner.state.clone(),
            busy: self.busy.load(Ordering::SeqCst),
            recording: self.recording.load(Ordering::SeqCst),
            model_loaded: inner.model.is_some(),
        });
    }
}

fn flatten<T>(joined: Result<Result<T, SessionError>, JoinError>) -> Result<T, SessionError> {
    flatten_with(joined, |e| {
        SessionError::Inference(format!("worker task failed: {e}"))
    })
}

fn flatten_with<T>(
    joined: Result<Result<T, SessionError>, JoinError>,
    on_join_error: impl FnOnce(JoinError) -> SessionError,
) -> Result<T, SessionError> {
    match joined {
        Ok(result) => result,
        Err(join_err) => Err(on_join_error(join_err)),
    }
}
