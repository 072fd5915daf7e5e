//! Service context
//!
//! [`IngestService`] is built once at startup and owns every long-lived
//! component: worker pool, concurrency gate, similarity index, genre model.
//! Each public operation is one request. Requests that touch the worker pool
//! or may rebuild the index are admitted through the gate first, and every
//! request that creates a session tears it down before returning.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{IngestConfig, ResolvedPaths};
use crate::db::{init_database_pool, CorpusSource, SqliteCorpus};
use crate::error::{IngestError, IngestResult};
use crate::models::RequestSession;
use crate::services::{
    CommandTranscriber, ConcurrencyGate, GatePermit, LanguageDetector, LyricNormalizer, Normalizer,
    ScriptLanguageDetector, ToolCommand, ToolRunner, Transcriber, WorkerPool,
};
use crate::similarity::{
    normalize_genre_label, pairwise_similarity, GenreModel, RefreshReport, SimilarityIndex,
    SnapshotStore, Unscored,
};
use crate::workflow::{PipelineOrchestrator, PipelineOutcome, UploadIntake, UploadedFile};

/// Song submitted for checking: audio to transcribe, or lyrics as text
#[derive(Debug, Clone)]
pub enum SongInput {
    Audio(UploadedFile),
    Lyrics(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityReport {
    /// Set when the lyrics came from an audio pipeline
    pub request_id: Option<Uuid>,
    pub lyrics: String,
    pub score: f64,
    pub threshold: f64,
    pub is_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionReport {
    pub request_id: Uuid,
    pub lyrics: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreReport {
    pub request_id: Option<Uuid>,
    pub lyrics: String,
    pub genre: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareReport {
    pub request_id: Uuid,
    pub transcript: String,
    pub score: f64,
    pub threshold: f64,
    pub is_not_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreTrainingReport {
    pub genres: Vec<String>,
    pub documents: usize,
    pub model_path: PathBuf,
}

/// Collaborators and settings the service is built from
pub struct ServiceContext {
    pub config: IngestConfig,
    pub paths: ResolvedPaths,
    pub corpus: Arc<dyn CorpusSource>,
    pub normalizer: Arc<dyn Normalizer>,
    pub detector: Arc<dyn LanguageDetector>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl ServiceContext {
    /// Default collaborators: SQLite corpus, lyric normalizer, script-based
    /// language detector, command-line transcriber
    pub async fn from_config(config: IngestConfig, paths: ResolvedPaths) -> IngestResult<Self> {
        let pool = init_database_pool(&paths.database_path).await?;
        let normalizer = LyricNormalizer::from_files(
            config.normalizer.contractions_file.as_deref(),
            config.normalizer.remove_file.as_deref(),
        )?;
        let transcriber = CommandTranscriber::from_argv(&config.tools.transcriber_command)
            .ok_or_else(|| IngestError::Internal("transcriber command is not configured".to_string()))?;

        Ok(Self {
            config,
            paths,
            corpus: Arc::new(SqliteCorpus::new(pool)),
            normalizer: Arc::new(normalizer),
            detector: Arc::new(ScriptLanguageDetector::new()),
            transcriber: Arc::new(transcriber),
        })
    }
}

pub struct IngestService {
    config: IngestConfig,
    paths: ResolvedPaths,
    gate: ConcurrencyGate,
    pool: Arc<WorkerPool>,
    orchestrator: PipelineOrchestrator,
    intake: UploadIntake,
    index: SimilarityIndex,
    corpus: Arc<dyn CorpusSource>,
    normalizer: Arc<dyn Normalizer>,
    genre_model: RwLock<Option<Arc<GenreModel>>>,
}

impl IngestService {
    /// Create directories, start the worker pool, load persisted state
    pub async fn start(context: ServiceContext) -> IngestResult<Self> {
        let ServiceContext {
            config,
            paths,
            corpus,
            normalizer,
            detector,
            transcriber,
        } = context;

        tokio::fs::create_dir_all(&paths.scratch_root).await?;
        tokio::fs::create_dir_all(&paths.cache_dir).await?;

        let pipeline = &config.pipeline;
        let pool = Arc::new(WorkerPool::new(WorkerPool::default_size(pipeline.max_workers)));
        let gate = ConcurrencyGate::new(pipeline.max_concurrent_pipelines);
        let intake = UploadIntake::new(pipeline.max_upload_bytes);
        let orchestrator = PipelineOrchestrator::new(
            Arc::clone(&pool),
            transcriber,
            config.tools.clone(),
            config.pipeline.clone(),
        );

        let index = SimilarityIndex::new(
            Arc::clone(&corpus),
            Arc::clone(&normalizer),
            detector,
            Some(SnapshotStore::new(&paths.cache_dir)),
        );
        index.load_persisted().await;

        let model_path = paths.genre_model_path.clone();
        let genre_model = match tokio::task::spawn_blocking(move || GenreModel::load(&model_path)).await {
            Ok(Ok(model)) => model.map(Arc::new),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Ignoring unreadable genre model");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Genre model load task failed");
                None
            }
        };

        if let Some(ffmpeg) = ToolCommand::from_argv(&config.tools.ffmpeg_command) {
            ToolRunner::new().probe_version(ffmpeg).await;
        }

        tracing::info!(
            scratch = %paths.scratch_root.display(),
            cache = %paths.cache_dir.display(),
            workers = pool.size(),
            gate = gate.capacity(),
            genre_model = genre_model.is_some(),
            "Ingest service started"
        );

        Ok(Self {
            config,
            paths,
            gate,
            pool,
            orchestrator,
            intake,
            index,
            corpus,
            normalizer,
            genre_model: RwLock::new(genre_model),
        })
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    /// Duplicate check against the corpus
    pub async fn check_similarity(&self, input: SongInput) -> IngestResult<SimilarityReport> {
        let (request_id, lyrics) = self.lyrics_for(input).await?;

        let _permit = self.admit().await?;
        let score = self.index.score(&lyrics).await?.ok_or_else(|| unscorable(&self.index, &lyrics))?;

        let threshold = self.config.pipeline.match_threshold;
        let report = SimilarityReport {
            request_id,
            lyrics,
            score: round4(score),
            threshold: round4(threshold),
            is_match: score >= threshold,
        };
        tracing::info!(
            request_id = ?request_id,
            score = report.score,
            is_match = report.is_match,
            "Similarity checked"
        );
        Ok(report)
    }

    /// Run the pipeline and return the transcript
    pub async fn transcribe(&self, upload: UploadedFile) -> IngestResult<TranscriptionReport> {
        let outcome = self.run_pipeline(upload).await?;
        Ok(TranscriptionReport {
            request_id: outcome.request_id,
            lyrics: outcome.transcript,
        })
    }

    /// Closest genre for the song's lyrics
    pub async fn predict_genre(&self, input: SongInput) -> IngestResult<GenreReport> {
        let model = self
            .genre_model
            .read()
            .await
            .clone()
            .ok_or_else(|| IngestError::Unavailable("genre model not trained".to_string()))?;

        let (request_id, lyrics) = self.lyrics_for(input).await?;
        if self.index.screen(&lyrics).is_err() {
            return Err(unscorable(&self.index, &lyrics));
        }

        let _permit = self.admit().await?;
        let normalizer = Arc::clone(&self.normalizer);
        let text = lyrics.clone();
        let prediction = tokio::task::spawn_blocking(move || model.predict(&normalizer.normalize(&text)))
            .await
            .map_err(|e| IngestError::Internal(format!("Genre prediction task failed: {}", e)))?
            .ok_or_else(|| {
                IngestError::EmptyResult("lyrics share no vocabulary with the genre model".to_string())
            })?;

        Ok(GenreReport {
            request_id,
            lyrics,
            genre: prediction.genre,
            confidence: round4(prediction.confidence),
        })
    }

    /// Compare user-supplied lyrics with the transcript of their audio
    pub async fn compare_lyrics(&self, upload: UploadedFile, lyrics: &str) -> IngestResult<CompareReport> {
        if lyrics.trim().is_empty() {
            return Err(IngestError::InputValidation("Lyrics are empty".to_string()));
        }
        let outcome = self.run_pipeline(upload).await?;

        let normalizer = Arc::clone(&self.normalizer);
        let user = lyrics.to_string();
        let transcript = outcome.transcript.clone();
        let score = tokio::task::spawn_blocking(move || {
            pairwise_similarity(&normalizer.normalize(&user), &normalizer.normalize(&transcript))
        })
        .await
        .map_err(|e| IngestError::Internal(format!("Comparison task failed: {}", e)))?;

        let threshold = self.config.pipeline.compare_threshold;
        Ok(CompareReport {
            request_id: outcome.request_id,
            transcript: outcome.transcript,
            score: round4(score),
            threshold: round4(threshold),
            is_not_match: score <= threshold,
        })
    }

    /// Rebuild the similarity index if the corpus changed
    pub async fn refresh_index(&self) -> IngestResult<RefreshReport> {
        let _permit = self.admit().await?;
        self.index.refresh_report().await
    }

    /// Train the genre model from labelled corpus documents and persist it
    pub async fn train_genre_model(&self) -> IngestResult<GenreTrainingReport> {
        let _permit = self.admit().await?;
        let documents = self.corpus.fetch_documents().await?;

        let normalizer = Arc::clone(&self.normalizer);
        let model_path = self.paths.genre_model_path.clone();
        let (model, count) = tokio::task::spawn_blocking(move || -> IngestResult<(GenreModel, usize)> {
            let samples: Vec<(String, String)> = documents
                .into_iter()
                .filter_map(|d| {
                    let genre = normalize_genre_label(d.genre.as_deref()?);
                    Some((normalizer.normalize(&d.lyrics), genre))
                })
                .collect();
            let count = samples.len();
            let model = GenreModel::fit(&samples).ok_or_else(|| {
                IngestError::EmptyResult("no labelled corpus documents to train on".to_string())
            })?;
            model.save(&model_path)?;
            Ok((model, count))
        })
        .await
        .map_err(|e| IngestError::Internal(format!("Genre training task failed: {}", e)))??;

        let genres: Vec<String> = model.genres().into_iter().map(str::to_string).collect();
        *self.genre_model.write().await = Some(Arc::new(model));

        tracing::info!(genres = genres.len(), documents = count, "Genre model trained");
        Ok(GenreTrainingReport {
            genres,
            documents: count,
            model_path: self.paths.genre_model_path.clone(),
        })
    }

    /// Reject new work, join the worker pool, remove scratch space
    pub async fn shutdown(&self) {
        self.gate.close();
        self.pool.shutdown().await;
        if let Err(e) = tokio::fs::remove_dir_all(&self.paths.scratch_root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "Failed to remove scratch root");
            }
        }
        tracing::info!("Ingest service stopped");
    }

    async fn admit(&self) -> IngestResult<GatePermit> {
        self.gate
            .admit()
            .await
            .map_err(|_| IngestError::Unavailable("service is shutting down".to_string()))
    }

    async fn lyrics_for(&self, input: SongInput) -> IngestResult<(Option<Uuid>, String)> {
        match input {
            SongInput::Lyrics(text) => Ok((None, text)),
            SongInput::Audio(upload) => {
                let outcome = self.run_pipeline(upload).await?;
                Ok((Some(outcome.request_id), outcome.transcript))
            }
        }
    }

    /// Admission, session, pipeline, teardown
    async fn run_pipeline(&self, upload: UploadedFile) -> IngestResult<PipelineOutcome> {
        // Reject bad uploads before queueing or touching disk
        self.intake.check(&upload.filename, upload.len())?;

        let _permit = self.admit().await?;
        let mut session = RequestSession::create(&self.paths.scratch_root).await?;
        let request_id = session.id();

        let result = async {
            let input = self.intake.store(&session, upload).await?;
            self.orchestrator.run(&mut session, &input).await
        }
        .await;

        if let Err(e) = session.teardown().await {
            // The drop guard tries again when `session` goes out of scope
            tracing::error!(request_id = %request_id, error = %e, "Session teardown failed");
        }

        result
    }
}

fn unscorable(index: &SimilarityIndex, lyrics: &str) -> IngestError {
    match index.screen(lyrics) {
        Err(Unscored::Empty) | Ok(()) => IngestError::EmptyResult("lyrics are empty".to_string()),
        Err(Unscored::Unsupported(verdict)) => IngestError::EmptyResult(format!(
            "lyrics language not supported ({:?})",
            verdict
        )),
    }
}

fn round4(value: f32) -> f64 {
    (value as f64 * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(1.0), 1.0);
        assert_eq!(round4(0.0), 0.0);
    }
}
