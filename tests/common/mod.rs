// Shared test doubles for the session capability seams.
//
// Each mock records its calls so tests can assert on sequencing (how many
// transcriptions ran, what got released) without real audio or inference.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use async_trait::async_trait;
use murmur::{
    AudioCapture, AudioCodec, AudioPlayback, BenchmarkStats, CaptureErrorHandler,
    CompletionCallback, InferenceEngine, ModelHandle, SessionError, Settings, TranscribeOptions,
};

/// Scripted inference engine.
///
/// `transcribe` can be made to block on a channel (for busy-gate and
/// teardown tests) or to fail; everything else returns canned data.
pub struct MockEngine {
    pub transcript: Mutex<String>,
    pub fail_load: AtomicBool,
    pub fail_transcribe: AtomicBool,
    pub load_calls: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
    pub memory_bench_calls: AtomicUsize,
    pub mat_mul_bench_calls: AtomicUsize,
    pub released: Mutex<Vec<u64>>,
    pub last_samples_len: AtomicUsize,
    pub last_options: Mutex<Option<TranscribeOptions>>,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    next_handle: AtomicUsize,
}

impl MockEngine {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: Mutex::new(transcript.to_string()),
            fail_load: AtomicBool::new(false),
            fail_transcribe: AtomicBool::new(false),
            load_calls: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
            memory_bench_calls: AtomicUsize::new(0),
            mat_mul_bench_calls: AtomicUsize::new(0),
            released: Mutex::new(Vec::new()),
            last_samples_len: AtomicUsize::new(0),
            last_options: Mutex::new(None),
            gate: Mutex::new(None),
            next_handle: AtomicUsize::new(1),
        }
    }

    /// Make the next `transcribe` calls block until the returned sender
    /// fires (one message per call).
    pub fn gate_transcribe(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }
}

impl InferenceEngine for MockEngine {
    fn load(&self, _path: &Path) -> Result<ModelHandle, SessionError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(SessionError::Inference("model file is corrupt".to_string()));
        }
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(ModelHandle::new(id))
    }

    fn transcribe(
        &self,
        _handle: ModelHandle,
        samples: &[f32],
        options: &TranscribeOptions,
    ) -> Result<String, SessionError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        self.last_samples_len.store(samples.len(), Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());

        let gate = self.gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.recv();
            // Leave the gate armed for any later call in the same test.
            *self.gate.lock().unwrap() = Some(rx);
        }

        if self.fail_transcribe.load(Ordering::SeqCst) {
            return Err(SessionError::Inference("decoder blew up".to_string()));
        }
        Ok(self.transcript.lock().unwrap().clone())
    }

    fn benchmark_memory(
        &self,
        _handle: ModelHandle,
        runs: usize,
    ) -> Result<BenchmarkStats, SessionError> {
        self.memory_bench_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BenchmarkStats::from_latencies(vec![1; runs.max(1)]))
    }

    fn benchmark_mat_mul(
        &self,
        _handle: ModelHandle,
        runs: usize,
    ) -> Result<BenchmarkStats, SessionError> {
        self.mat_mul_bench_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BenchmarkStats::from_latencies(vec![2; runs.max(1)]))
    }

    fn system_info(&self) -> String {
        "mock engine".to_string()
    }

    fn release(&self, handle: ModelHandle) {
        self.released.lock().unwrap().push(handle.id());
    }
}

/// Capture double. `stop` returns whatever `set_produced` scripted; the
/// error handler passed to `start` is kept so tests can fire async failures.
pub struct MockCapture {
    pub fail_start: AtomicBool,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub last_target: Mutex<Option<PathBuf>>,
    produced: Mutex<Option<PathBuf>>,
    handler: Mutex<Option<CaptureErrorHandler>>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self {
            fail_start: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            last_target: Mutex::new(None),
            produced: Mutex::new(None),
            handler: Mutex::new(None),
        }
    }

    pub fn set_produced(&self, path: PathBuf) {
        *self.produced.lock().unwrap() = Some(path);
    }

    /// Simulate a device failure after `start` returned.
    pub fn fire_error(&self, message: &str) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(SessionError::Capture(message.to_string()));
        }
    }
}

#[async_trait]
impl AudioCapture for MockCapture {
    async fn start(
        &self,
        target: &Path,
        on_error: CaptureErrorHandler,
    ) -> Result<(), SessionError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(SessionError::Capture("no input device".to_string()));
        }
        *self.last_target.lock().unwrap() = Some(target.to_path_buf());
        *self.handler.lock().unwrap() = Some(on_error);
        Ok(())
    }

    async fn stop(&self) -> Result<Option<PathBuf>, SessionError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.produced.lock().unwrap().take())
    }
}

/// Codec double that ignores the file and returns fixed samples.
pub struct MockCodec {
    pub samples: Vec<f32>,
    pub fail: AtomicBool,
    pub decode_calls: AtomicUsize,
}

impl MockCodec {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            fail: AtomicBool::new(false),
            decode_calls: AtomicUsize::new(0),
        }
    }
}

impl AudioCodec for MockCodec {
    fn decode(&self, _path: &Path) -> Result<Vec<f32>, SessionError> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::Decode("corrupt header".to_string()));
        }
        Ok(self.samples.clone())
    }
}

/// Playback spy.
pub struct SpyPlayback {
    pub played: Mutex<Vec<PathBuf>>,
    pub stop_calls: AtomicUsize,
}

impl SpyPlayback {
    pub fn new() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            stop_calls: AtomicUsize::new(0),
        }
    }
}

impl AudioPlayback for SpyPlayback {
    fn play(&self, path: &Path) {
        self.played.lock().unwrap().push(path.to_path_buf());
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Completion callback that collects every message it receives.
pub fn collector() -> (CompletionCallback, Arc<Mutex<Vec<String>>>) {
    let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    let callback: CompletionCallback = Arc::new(move |message| {
        sink.lock().unwrap().push(message);
    });
    (callback, messages)
}

/// Settings rooted in a temp directory, with one model file and one sample
/// file seeded so both directory scans succeed.
pub fn seeded_settings(root: &Path) -> Settings {
    let models_dir = root.join("models");
    let samples_dir = root.join("samples");
    std::fs::create_dir_all(&models_dir).unwrap();
    std::fs::create_dir_all(&samples_dir).unwrap();
    std::fs::write(models_dir.join("tiny.bin"), b"model bytes").unwrap();
    std::fs::write(samples_dir.join("sample.wav"), b"not real audio").unwrap();

    Settings {
        model_path: None,
        models_dir,
        sample_path: None,
        samples_dir,
        output_path: root.join("transcripts/transcript.txt"),
        recordings_dir: root.join("recordings"),
        debug_log_path: None,
        ..Settings::default()
    }
}
