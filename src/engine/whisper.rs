//! whisper.cpp-backed inference engine via the whisper-rs bindings.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{BenchmarkStats, InferenceEngine, ModelHandle, TranscribeOptions};
use crate::audio::TARGET_SAMPLE_RATE;
use crate::error::SessionError;

/// Engine wrapping whisper.cpp contexts.
///
/// Contexts live in a handle table behind `Arc`, so releasing a handle while
/// a transcription is mid-flight only drops the table entry; the context
/// itself survives until the last borrower finishes.
pub struct WhisperEngine {
    contexts: Mutex<HashMap<u64, Arc<WhisperContext>>>,
    next_handle: AtomicU64,
    n_threads: i32,
}

impl WhisperEngine {
    pub fn new() -> Self {
        let n_threads = std::thread::available_parallelism()
            .map(|p| p.get() as i32)
            .unwrap_or(4);

        Self {
            contexts: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            n_threads,
        }
    }

    fn context(&self, handle: ModelHandle) -> Result<Arc<WhisperContext>, SessionError> {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&handle.id())
            .cloned()
            .ok_or_else(|| SessionError::Inference("model handle is not loaded".to_string()))
    }

    fn base_params(&self) -> FullParams<'_, '_> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.n_threads);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);
        params
    }
}

impl Default for WhisperEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for WhisperEngine {
    fn load(&self, path: &Path) -> Result<ModelHandle, SessionError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| SessionError::Inference("model path is not valid UTF-8".to_string()))?;

        info!("Loading whisper model from {}", path.display());
        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SessionError::Inference(format!("failed to load model: {e}")))?;

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(ctx));

        Ok(ModelHandle::new(id))
    }

    fn transcribe(
        &self,
        handle: ModelHandle,
        samples: &[f32],
        options: &TranscribeOptions,
    ) -> Result<String, SessionError> {
        let ctx = self.context(handle)?;

        let mut params = self.base_params();
        params.set_translate(options.translate);
        params.set_token_timestamps(options.emit_timestamps);
        match options.language.as_deref() {
            Some(lang) => params.set_language(Some(lang)),
            None => params.set_language(Some("auto")),
        }
        if let Some(prompt) = options.prompt.as_deref() {
            params.set_initial_prompt(prompt);
        }

        let mut state = ctx
            .create_state()
            .map_err(|e| SessionError::Inference(format!("failed to create state: {e}")))?;
        state
            .full(params, samples)
            .map_err(|e| SessionError::Inference(format!("inference failed: {e}")))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SessionError::Inference(format!("failed to read segments: {e}")))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| SessionError::Inference(format!("failed to read segment: {e}")))?;
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            if options.emit_timestamps {
                // Segment times are in centiseconds.
                let t0 = state
                    .full_get_segment_t0(i)
                    .map_err(|e| SessionError::Inference(e.to_string()))?;
                let t1 = state
                    .full_get_segment_t1(i)
                    .map_err(|e| SessionError::Inference(e.to_string()))?;
                text.push_str(&format!(
                    "[{:.2}s -> {:.2}s] {}\n",
                    t0 as f32 / 100.0,
                    t1 as f32 / 100.0,
                    segment
                ));
            } else {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(segment);
            }
        }

        Ok(text.trim_end().to_string())
    }

    fn benchmark_memory(
        &self,
        handle: ModelHandle,
        runs: usize,
    ) -> Result<BenchmarkStats, SessionError> {
        // The copy loop doesn't touch the model, but the handle must still be
        // live: benchmarks only make sense against a loaded session.
        self.context(handle)?;

        let block = vec![0u8; 64 * 1024 * 1024];
        let mut latencies = Vec::with_capacity(runs.max(1));
        for _ in 0..runs.max(1) {
            let started = Instant::now();
            let copy = block.clone();
            std::hint::black_box(&copy);
            latencies.push(started.elapsed().as_millis() as u64);
        }

        Ok(BenchmarkStats::from_latencies(latencies))
    }

    fn benchmark_mat_mul(
        &self,
        handle: ModelHandle,
        runs: usize,
    ) -> Result<BenchmarkStats, SessionError> {
        let ctx = self.context(handle)?;

        // One second of silence pushes a full decode through the
        // matmul-heavy path without needing fixture audio.
        let samples = vec![0.0f32; TARGET_SAMPLE_RATE as usize];
        let mut latencies = Vec::with_capacity(runs.max(1));

        for _ in 0..runs.max(1) {
            let mut params = self.base_params();
            params.set_language(Some("en"));

            let mut state = ctx
                .create_state()
                .map_err(|e| SessionError::Inference(format!("failed to create state: {e}")))?;

            let started = Instant::now();
            state
                .full(params, &samples)
                .map_err(|e| SessionError::Inference(format!("benchmark run failed: {e}")))?;
            latencies.push(started.elapsed().as_millis() as u64);
        }

        Ok(BenchmarkStats::from_latencies(latencies))
    }

    fn system_info(&self) -> String {
        format!(
            "{} {} / {} threads",
            std::env::consts::OS,
            std::env::consts::ARCH,
            self.n_threads
        )
    }

    fn release(&self, handle: ModelHandle) {
        let removed = self
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.id());
        if removed.is_some() {
            info!("Released model handle {}", handle.id());
        }
    }
}
