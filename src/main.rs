use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use murmur::{
    Capabilities, FrameCapture, NullPlayback, SessionController, Settings, SymphoniaCodec,
};

#[derive(Parser)]
#[command(name = "murmur", about = "Offline speech-to-text sessions", version)]
struct Cli {
    /// Config file (TOML/YAML/JSON), merged under the command-line flags
    #[arg(long, default_value = "config/murmur")]
    config: String,

    /// Model file; falls back to scanning --models-dir
    #[arg(long)]
    model: Option<PathBuf>,

    /// Directory scanned when no usable model path is given
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Directory scanned when no usable sample path is given
    #[arg(long)]
    samples_dir: Option<PathBuf>,

    /// Mirror session diagnostics to this file
    #[arg(long)]
    debug_log: Option<PathBuf>,

    /// Language hint, e.g. "en"; omit for auto-detect
    #[arg(long)]
    language: Option<String>,

    /// Translate the transcript to English
    #[arg(long)]
    translate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe a sample file and print the transcript
    Transcribe {
        /// Input audio file; falls back to scanning --samples-dir
        #[arg(long)]
        sample: Option<PathBuf>,

        /// Where to save the transcript
        #[arg(long)]
        output: Option<PathBuf>,

        /// Initial prompt to bias decoding
        #[arg(long)]
        prompt: Option<String>,

        /// Prefix segments with timing and log inference duration
        #[arg(long)]
        timestamps: bool,
    },
    /// Run the engine benchmarks and print the debug log
    Bench {
        /// Iterations per benchmark
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[cfg(feature = "whisper")]
fn engine() -> Result<Arc<dyn murmur::InferenceEngine>> {
    Ok(Arc::new(murmur::engine::WhisperEngine::new()))
}

#[cfg(not(feature = "whisper"))]
fn engine() -> Result<Arc<dyn murmur::InferenceEngine>> {
    anyhow::bail!("this build has no inference engine; rebuild with --features whisper")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.config)?;

    if cli.model.is_some() {
        settings.model_path = cli.model;
    }
    if let Some(dir) = cli.models_dir {
        settings.models_dir = dir;
    }
    if let Some(dir) = cli.samples_dir {
        settings.samples_dir = dir;
    }
    if cli.debug_log.is_some() {
        settings.debug_log_path = cli.debug_log;
    }
    if cli.language.is_some() {
        settings.language = cli.language;
    }
    if cli.translate {
        settings.translate = true;
    }

    if let Command::Transcribe {
        sample,
        output,
        prompt,
        timestamps,
    } = &cli.command
    {
        if sample.is_some() {
            settings.sample_path = sample.clone();
        }
        if let Some(output) = output {
            settings.output_path = output.clone();
        }
        if prompt.is_some() {
            settings.prompt = prompt.clone();
        }
        if *timestamps {
            settings.emit_timestamps = true;
        }
    }

    // The CLI has no microphone driver; the capture seam stays wired but
    // its frame channel is never fed.
    let (_frame_tx, frame_rx) = tokio::sync::mpsc::channel(16);
    let caps = Capabilities {
        engine: engine()?,
        codec: Arc::new(SymphoniaCodec),
        capture: Arc::new(FrameCapture::new(frame_rx)),
        playback: Arc::new(NullPlayback),
    };

    let (done_tx, done_rx) = mpsc::channel::<String>();
    let on_complete: murmur::CompletionCallback = Arc::new(move |message| {
        let _ = done_tx.send(message);
    });

    let session = SessionController::new(settings, caps, on_complete);
    session.load_model().await?;

    let exit = match cli.command {
        Command::Transcribe { .. } => {
            session.transcribe_sample().await;
            match done_rx.try_recv() {
                Ok(message) if message.starts_with("ERROR: ") => {
                    eprintln!("{message}");
                    1
                }
                Ok(transcript) => {
                    println!("{transcript}");
                    0
                }
                Err(_) => {
                    eprintln!("ERROR: no transcription outcome was produced");
                    1
                }
            }
        }
        Command::Bench { runs } => {
            session.run_benchmark(runs).await;
            print!("{}", session.debug_log().contents());
            0
        }
    };

    session.shutdown().await;
    info!("Done");

    std::process::exit(exit);
}
