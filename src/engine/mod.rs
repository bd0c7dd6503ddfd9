//! Inference engine capability
//!
//! The session controller owns exactly one loaded model at a time and talks
//! to the engine through this narrow surface: load a model from a path,
//! transcribe a normalized sample buffer, run benchmarks, and release the
//! handle when done. Engine internals (model format, decoding strategy) are
//! the implementation's business.

use std::path::Path;

use serde::Serialize;

use crate::error::SessionError;

#[cfg(feature = "whisper")]
mod whisper;

#[cfg(feature = "whisper")]
pub use whisper::WhisperEngine;

/// Opaque id for a loaded model. Minted by the engine, held exclusively by
/// one session, and given back through `release` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Per-request knobs forwarded to the engine.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    /// Prefix each segment with its timing.
    pub emit_timestamps: bool,
    /// Initial prompt to bias decoding.
    pub prompt: Option<String>,
    /// Language hint; `None` means auto-detect.
    pub language: Option<String>,
    /// Translate the output to English.
    pub translate: bool,
}

/// Latency summary for one benchmark, log-only output.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkStats {
    pub runs: usize,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub avg_ms: f64,
}

impl BenchmarkStats {
    pub fn from_latencies(mut latencies_ms: Vec<u64>) -> Self {
        latencies_ms.sort_unstable();
        let runs = latencies_ms.len();
        if runs == 0 {
            return Self {
                runs: 0,
                p50_ms: 0,
                p95_ms: 0,
                avg_ms: 0.0,
            };
        }

        let avg_ms = latencies_ms.iter().sum::<u64>() as f64 / runs as f64;
        Self {
            runs,
            p50_ms: latencies_ms[percentile_index(runs, 0.50)],
            p95_ms: latencies_ms[percentile_index(runs, 0.95)],
            avg_ms,
        }
    }
}

impl std::fmt::Display for BenchmarkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} runs, p50 {} ms, p95 {} ms, avg {:.1} ms",
            self.runs, self.p50_ms, self.p95_ms, self.avg_ms
        )
    }
}

/// The inference engine capability.
///
/// Calls may block for a long time (model load, decode); the controller
/// always invokes them through `spawn_blocking`. A `release` racing an
/// in-flight `transcribe` on the same handle must be safe: the transcription
/// either completes or fails cleanly, never crashes.
pub trait InferenceEngine: Send + Sync {
    fn load(&self, path: &Path) -> Result<ModelHandle, SessionError>;

    fn transcribe(
        &self,
        handle: ModelHandle,
        samples: &[f32],
        options: &TranscribeOptions,
    ) -> Result<String, SessionError>;

    fn benchmark_memory(
        &self,
        handle: ModelHandle,
        runs: usize,
    ) -> Result<BenchmarkStats, SessionError>;

    fn benchmark_mat_mul(
        &self,
        handle: ModelHandle,
        runs: usize,
    ) -> Result<BenchmarkStats, SessionError>;

    fn system_info(&self) -> String;

    fn release(&self, handle: ModelHandle);
}

fn percentile_index(len: usize, percentile: f64) -> usize {
    if len <= 1 {
        return 0;
    }
    let idx = ((len as f64 - 1.0) * percentile.clamp(0.0, 1.0)).round() as usize;
    idx.min(len - 1)
}
