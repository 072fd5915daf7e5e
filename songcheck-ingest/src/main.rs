//! songcheck-ingest command-line entry point
//!
//! Every subcommand prints one JSON document on stdout: the result, or a
//! structured failure (`{"error": {...}}`) with a non-zero exit status.
//! Logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::info;

use songcheck_common::config::{default_config_path, RootFolderInitializer};
use songcheck_ingest::config::MODULE_NAME;
use songcheck_ingest::workflow::UploadIntake;
use songcheck_ingest::{IngestConfig, IngestResult, IngestService, ServiceContext, SongInput};

/// Command-line arguments for songcheck-ingest
#[derive(Parser, Debug)]
#[command(name = "songcheck-ingest")]
#[command(about = "Lyric fingerprinting and duplicate detection for uploaded songs")]
#[command(version)]
struct Args {
    /// Bootstrap TOML config (defaults to the platform config directory)
    #[arg(short, long, env = "SONGCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for scratch space, cache and database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a song against the corpus for duplicates
    CheckSimilarity {
        /// Audio file (.mp3 or .wav)
        #[arg(long, conflicts_with = "lyrics", required_unless_present = "lyrics")]
        audio: Option<PathBuf>,
        /// Lyrics text instead of audio
        #[arg(long)]
        lyrics: Option<String>,
    },
    /// Transcribe the lyrics of an audio file
    Transcribe {
        audio: PathBuf,
    },
    /// Predict the genre of a song
    PredictGenre {
        #[arg(long, conflicts_with = "lyrics", required_unless_present = "lyrics")]
        audio: Option<PathBuf>,
        #[arg(long)]
        lyrics: Option<String>,
    },
    /// Check whether submitted lyrics match the audio they came with
    Compare {
        audio: PathBuf,
        /// File containing the submitted lyrics
        lyrics_file: PathBuf,
    },
    /// Rebuild the similarity index if the corpus changed
    RebuildIndex,
    /// Train the genre model from labelled corpus songs
    TrainGenre,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path(MODULE_NAME))
        .unwrap_or_else(|| PathBuf::from(format!("{}.toml", MODULE_NAME)));
    let config = IngestConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    songcheck_common::logging::init_tracing(&config.logging)?;

    info!("Starting songcheck-ingest {}", env!("CARGO_PKG_VERSION"));

    let paths = config.resolve_paths(args.root_folder.clone());
    RootFolderInitializer::new(paths.root_folder.clone())
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", paths.root_folder.display());

    let max_upload_bytes = config.pipeline.max_upload_bytes;
    let context = ServiceContext::from_config(config, paths)
        .await
        .context("Failed to initialize service context")?;
    let service = IngestService::start(context)
        .await
        .context("Failed to start ingest service")?;

    let intake = UploadIntake::new(max_upload_bytes);
    let outcome = tokio::select! {
        outcome = execute(&service, &intake, args.command) => Some(outcome),
        _ = signal::ctrl_c() => None,
    };

    service.shutdown().await;

    match outcome {
        Some(Ok(json)) => {
            println!("{}", json);
            Ok(())
        }
        Some(Err(e)) => {
            println!("{}", serde_json::to_string_pretty(&e.report())?);
            std::process::exit(1);
        }
        None => {
            info!("Interrupted");
            std::process::exit(130);
        }
    }
}

async fn execute(service: &IngestService, intake: &UploadIntake, command: Command) -> IngestResult<String> {
    match command {
        Command::CheckSimilarity { audio, lyrics } => {
            let input = song_input(intake, audio, lyrics).await?;
            to_json(&service.check_similarity(input).await?)
        }
        Command::Transcribe { audio } => {
            let upload = intake.read_file(&audio).await?;
            to_json(&service.transcribe(upload).await?)
        }
        Command::PredictGenre { audio, lyrics } => {
            let input = song_input(intake, audio, lyrics).await?;
            to_json(&service.predict_genre(input).await?)
        }
        Command::Compare { audio, lyrics_file } => {
            let lyrics = tokio::fs::read_to_string(&lyrics_file).await.map_err(|e| {
                songcheck_ingest::IngestError::InputValidation(format!(
                    "Cannot read {}: {}",
                    lyrics_file.display(),
                    e
                ))
            })?;
            let upload = intake.read_file(&audio).await?;
            to_json(&service.compare_lyrics(upload, &lyrics).await?)
        }
        Command::RebuildIndex => to_json(&service.refresh_index().await?),
        Command::TrainGenre => to_json(&service.train_genre_model().await?),
    }
}

async fn song_input(
    intake: &UploadIntake,
    audio: Option<PathBuf>,
    lyrics: Option<String>,
) -> IngestResult<SongInput> {
    match (audio, lyrics) {
        (Some(path), _) => Ok(SongInput::Audio(intake.read_file(&path).await?)),
        (None, Some(text)) => Ok(SongInput::Lyrics(text)),
        (None, None) => Err(songcheck_ingest::IngestError::InputValidation(
            "either --audio or --lyrics is required".to_string(),
        )),
    }
}

fn to_json<T: Serialize>(value: &T) -> IngestResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| songcheck_ingest::IngestError::Internal(format!("Failed to encode result: {}", e)))
}
