//! services/podcast/src/bin/podcast.rs

use bidirection_protocol::{BidirectionClient, ClientOptions, Credentials};
use clap::Parser;
use podcast_core::ProsodyOverrides;
use podcast_lib::{
    adapters::{BidirectionTtsAdapter, FileAudioMerger, ScriptDialogueSource, WebSocketConnector},
    batch::{discover_inputs, BatchOptions, BatchRunner, FileOutcome},
    config::Config,
    error::AppError,
    interrupt::{self, Escalation},
    telemetry,
    voices::VoiceBook,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "podcast", about = "Synthesize dialogue scripts into podcast audio")]
struct Cli {
    /// A Markdown or Word script, or a directory of them.
    input: PathBuf,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Voice book JSON (overrides VOICE_MAP_PATH). Without one the built-in cast is used.
    #[arg(long)]
    voices: Option<PathBuf>,

    /// Default speech rate, -50..=100; 0 leaves it unset.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    speech_rate: i32,

    /// Default loudness rate, -50..=100; 0 leaves it unset.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    loudness_rate: i32,

    #[arg(long, default_value = "neutral")]
    emotion: String,

    /// Emotion strength, 1..=5; 0 leaves it unset.
    #[arg(long, default_value_t = 0.0)]
    emotion_scale: f32,

    /// Default pitch rate; 0 leaves it unset.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pitch_rate: i32,

    /// Segments synthesized in parallel (overrides BATCH_CONCURRENCY).
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    let log_file = telemetry::init(config.log_level, &config.log_dir)?;
    info!(log_file = %log_file.display(), "Configuration loaded");

    // --- 2. Load the Voice Book ---
    let voices = match cli.voices.clone().or_else(|| config.voice_map_path.clone()) {
        Some(path) => {
            info!(path = %path.display(), "Loading voice book");
            VoiceBook::load(&path)?
        }
        None => {
            info!("No voice book configured; using the built-in cast");
            VoiceBook::default()
        }
    };
    for (speaker, voice) in voices.assignments() {
        info!("   {} -> {}", speaker, voice);
    }
    if voices.default_voices().is_empty() {
        warn!("No default voices; lines from unmapped speakers will be skipped");
    } else {
        info!(default_voices = ?voices.default_voices(), "Unmapped speakers rotate through default voices");
    }

    // --- 3. Initialize Service Adapters ---
    let client = BidirectionClient::new(
        Arc::new(WebSocketConnector::new()),
        Credentials {
            app_id: config.app_id.clone(),
            access_token: config.access_token.clone(),
        },
        ClientOptions {
            endpoint: config.endpoint.clone(),
            max_message_size: config.max_frame_bytes,
            receive_timeout: config.receive_timeout,
            ..Default::default()
        },
    );
    let tts = Arc::new(BidirectionTtsAdapter::new(client.clone()));
    let source = Arc::new(ScriptDialogueSource::new()?);
    let merger = Arc::new(FileAudioMerger::new());

    // --- 4. Build the Runner ---
    let runner = BatchRunner::new(
        tts,
        source,
        merger,
        voices,
        BatchOptions {
            output_dir: cli.output_dir.clone(),
            audio: config.audio,
            prosody: ProsodyOverrides {
                speech_rate: cli.speech_rate,
                loudness_rate: cli.loudness_rate,
                emotion: cli.emotion.clone(),
                emotion_scale: cli.emotion_scale,
                pitch_rate: cli.pitch_rate,
            },
            concurrency: cli.concurrency.unwrap_or(config.concurrency).max(1),
        },
    );

    let token = runner.cancellation_token();
    tokio::spawn(interrupt_watch(token.clone()));

    // --- 5. Run ---
    let inputs = discover_inputs(&cli.input)?;
    if inputs.is_empty() {
        warn!(input = %cli.input.display(), "No .md, .markdown or .docx scripts found");
        return Ok(());
    }
    info!(
        scripts = inputs.len(),
        output_dir = %cli.output_dir.display(),
        "Starting batch"
    );

    let reports = runner.run(&inputs).await;
    if token.is_cancelled() {
        // Dropped calls finish their connections in the background.
        let grace = config.receive_timeout + Duration::from_secs(1);
        if tokio::time::timeout(grace, client.wait_for_cleanup()).await.is_err() {
            warn!("Some connections did not finish cleanly before exit");
        }
    }
    let mut merged = 0;
    for report in &reports {
        match &report.outcome {
            FileOutcome::Merged(path) => {
                merged += 1;
                info!(
                    input = %report.input.display(),
                    output = %path.display(),
                    synthesized = report.synthesized,
                    reused = report.reused,
                    failed = report.failed,
                    unmapped = report.unmapped,
                    "Done"
                );
            }
            FileOutcome::NoAudio => error!(input = %report.input.display(), "No audio produced"),
            FileOutcome::Failed(reason) => error!(input = %report.input.display(), %reason, "Failed"),
            FileOutcome::Cancelled => warn!(input = %report.input.display(), "Cancelled"),
        }
    }
    info!(merged, total = inputs.len(), "Batch finished");

    Ok(())
}

/// Cancels the run on Ctrl-C; a second Ctrl-C exits without waiting for cleanup.
async fn interrupt_watch(token: tokio_util::sync::CancellationToken) {
    if interrupt::escalate(interrupt::ctrl_c(), token).await == Escalation::ExitNow {
        std::process::exit(130);
    }
}
