use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Immutable inputs for one session, captured at construction and never
/// mutated afterwards. The CLI maps its flags onto this; embedding hosts
/// build it directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Explicit model file. When unset, or set but missing, `models_dir` is
    /// scanned and the first entry wins.
    pub model_path: Option<PathBuf>,

    /// Fallback directory for model files.
    pub models_dir: PathBuf,

    /// Explicit input audio for file-based transcription; same fallback
    /// behavior as the model path.
    pub sample_path: Option<PathBuf>,

    /// Fallback directory for sample files.
    pub samples_dir: PathBuf,

    /// Where the transcript text is written. Parent directories are created
    /// as needed.
    pub output_path: PathBuf,

    /// Microphone recordings land here before transcription.
    pub recordings_dir: PathBuf,

    /// Initial prompt handed to the inference engine.
    pub prompt: Option<String>,

    /// Language hint (e.g. "en"); unset means auto-detect.
    pub language: Option<String>,

    /// Translate the transcript to English.
    pub translate: bool,

    /// Log a completion timestamp and ask the engine for segment timing.
    pub emit_timestamps: bool,

    /// Debug log file; unset keeps diagnostics in memory only.
    pub debug_log_path: Option<PathBuf>,

    /// When set, a failed transcript save turns the callback outcome into an
    /// error. The default keeps save failures log-only, so the callback
    /// always reports the transcription outcome itself.
    pub strict_persistence: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_path: None,
            models_dir: PathBuf::from("models"),
            sample_path: None,
            samples_dir: PathBuf::from("samples"),
            output_path: PathBuf::from("transcripts/transcript.txt"),
            recordings_dir: PathBuf::from("recordings"),
            prompt: None,
            language: None,
            translate: false,
            emit_timestamps: false,
            debug_log_path: None,
            strict_persistence: false,
        }
    }
}

impl Settings {
    /// Load settings from a config file (any format the `config` crate
    /// understands). A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
