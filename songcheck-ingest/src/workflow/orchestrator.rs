//! Pipeline orchestrator
//!
//! Drives one request's audio through the four stages, strictly in order:
//!
//! 1. **Separation**: whole mix → isolated vocals (reused if already valid)
//! 2. **Tempo**: vocals → slowed down by the configured factor
//! 3. **Silence trim**: stretched → silence removed, falling back to the
//!    stretched audio if trimming yields nothing usable
//! 4. **Transcription**: trimmed audio → text
//!
//! Every external call goes through the worker pool under the stage's outer
//! deadline, and every artifact is validated before the next stage sees it.
//! The orchestrator never retries; session teardown is the caller's job.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{PipelineSettings, SeparationFormat, ToolSettings};
use crate::error::{IngestError, IngestResult};
use crate::models::{PipelineRun, PipelineStage, PipelineState, RequestSession};
use crate::services::{
    AudioValidator, PoolError, ToolCommand, ToolError, ToolRunner, Transcriber, WorkerPool,
};

/// Result of a completed pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub request_id: Uuid,
    pub transcript: String,
    pub final_audio: PathBuf,
    pub run: PipelineRun,
}

/// Contents of `transcript.json`
#[derive(Debug, Clone, Serialize)]
struct TranscriptBlob<'a> {
    request_id: Uuid,
    source: &'a Path,
    text: &'a str,
    created_at: chrono::DateTime<chrono::Utc>,
}

pub struct PipelineOrchestrator {
    pool: Arc<WorkerPool>,
    runner: ToolRunner,
    validator: AudioValidator,
    transcriber: Arc<dyn Transcriber>,
    tools: ToolSettings,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        pool: Arc<WorkerPool>,
        transcriber: Arc<dyn Transcriber>,
        tools: ToolSettings,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            pool,
            runner: ToolRunner::new(),
            validator: AudioValidator::new(),
            transcriber,
            tools,
            settings,
        }
    }

    pub fn validator(&self) -> &AudioValidator {
        &self.validator
    }

    /// Run every stage on `input`, which must already live in `session`
    pub async fn run(&self, session: &mut RequestSession, input: &Path) -> IngestResult<PipelineOutcome> {
        let mut run = PipelineRun::new(session.id());

        match self.run_stages(session, &mut run, input).await {
            Ok((transcript, final_audio)) => {
                self.advance(&mut run, PipelineState::Done);
                tracing::info!(
                    request_id = %session.id(),
                    chars = transcript.len(),
                    "Pipeline complete"
                );
                Ok(PipelineOutcome {
                    request_id: session.id(),
                    transcript,
                    final_audio,
                    run,
                })
            }
            Err(e) => {
                run.fail();
                tracing::error!(
                    request_id = %session.id(),
                    category = e.category().as_str(),
                    error = %e,
                    "Pipeline failed"
                );
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        session: &mut RequestSession,
        run: &mut PipelineRun,
        input: &Path,
    ) -> IngestResult<(String, PathBuf)> {
        if let Err(reason) = self.validator.inspect_async(input.to_path_buf()).await {
            return Err(IngestError::InputValidation(format!(
                "Uploaded audio is unusable: {}",
                reason
            )));
        }

        self.enter(run, PipelineStage::Separation);
        let vocals = self.separate_vocals(session, input).await?;

        self.enter(run, PipelineStage::Tempo);
        let stretched = self.change_tempo(session, &vocals).await?;

        self.enter(run, PipelineStage::SilenceTrim);
        let trimmed = self.trim_silence(session, &stretched).await?;

        self.enter(run, PipelineStage::Transcription);
        let transcript = self.transcribe(session, &trimmed).await?;

        Ok((transcript, trimmed))
    }

    fn enter(&self, run: &mut PipelineRun, stage: PipelineStage) {
        tracing::info!(request_id = %run.request_id, stage = %stage, "Stage started");
        self.advance(run, stage.running_state());
    }

    fn advance(&self, run: &mut PipelineRun, state: PipelineState) {
        if let Err(e) = run.transition_to(state) {
            tracing::warn!(request_id = %run.request_id, error = %e, "Ignoring pipeline transition");
        }
    }

    /// Isolate the vocal track of `input`
    ///
    /// The tool writes `<out>/<model>/<stem>/vocals.<ext>`, which is moved to
    /// `<out>/<stem>_vocals.<ext>`. A valid file already at that path is reused
    /// without running the tool; an invalid one is deleted first.
    pub async fn separate_vocals(&self, session: &mut RequestSession, input: &Path) -> IngestResult<PathBuf> {
        let stage = PipelineStage::Separation;
        let stem = file_stem(input)?;
        let format = self.tools.separation_format;
        let out_dir = session.separation_dir();
        let vocals = out_dir.join(format!("{}_vocals.{}", stem, format.extension()));

        if tokio::fs::metadata(&vocals).await.is_ok() {
            if self.validator.validate_async(vocals.clone()).await {
                tracing::info!(
                    request_id = %session.id(),
                    path = %vocals.display(),
                    "Reusing existing separated vocals"
                );
                session.record_output(stage, vocals.clone());
                return Ok(vocals);
            }
            tracing::warn!(path = %vocals.display(), "Discarding invalid separated vocals");
            tokio::fs::remove_file(&vocals).await?;
        }

        let model_dir = out_dir.join(&self.tools.separation_model);
        let nested = model_dir
            .join(&stem)
            .join(format!("vocals.{}", format.extension()));

        let mut command = self
            .base_command(&self.tools.separation_command)?
            .arg("-o")
            .arg(&out_dir);
        if format == SeparationFormat::Mp3 {
            command = command.arg("--mp3");
        }
        let command = command
            .arg("-n")
            .arg(&self.tools.separation_model)
            .arg(format!("--device={}", self.tools.separation_device))
            .arg(input)
            .expects_output(&nested)
            .removes_on_failure(&model_dir);

        self.run_tool(session, stage, command).await?;

        tokio::fs::rename(&nested, &vocals).await?;
        // Other stems are not needed
        if let Err(e) = tokio::fs::remove_dir_all(&model_dir).await {
            tracing::warn!(path = %model_dir.display(), error = %e, "Failed to remove unused stems");
        }

        self.require_valid(stage, &vocals).await?;
        session.record_output(stage, vocals.clone());
        Ok(vocals)
    }

    /// Time-stretch `vocals` by the configured speed factor
    pub async fn change_tempo(&self, session: &mut RequestSession, vocals: &Path) -> IngestResult<PathBuf> {
        let stage = PipelineStage::Tempo;
        let output = session
            .final_output_dir()
            .join(format!("{}_slowdown.wav", file_stem(vocals)?));

        let command = self
            .base_command(&self.tools.ffmpeg_command)?
            .arg("-i")
            .arg(vocals)
            .arg("-filter:a")
            .arg(format!("atempo={}", self.settings.speed_factor))
            .arg("-vn")
            .args(["-loglevel", "info", "-y"])
            .arg(&output)
            .expects_output(&output)
            .removes_on_failure(&output);

        self.run_tool(session, stage, command).await?;
        self.require_valid(stage, &output).await?;

        session.record_output(stage, output.clone());
        Ok(output)
    }

    /// Remove silent stretches from `stretched`
    ///
    /// A failed or timed out tool fails the stage. A missing or invalid result
    /// falls back to `stretched` if that is still valid. The stretched
    /// intermediate is deleted only when the trimmed output is used.
    pub async fn trim_silence(&self, session: &mut RequestSession, stretched: &Path) -> IngestResult<PathBuf> {
        let stage = PipelineStage::SilenceTrim;
        let output = session
            .final_output_dir()
            .join(format!("{}_final.wav", file_stem(stretched)?));

        let filter = format!(
            "silenceremove=stop_periods=-1:stop_duration={}:stop_threshold={}",
            self.settings.min_silence_duration, self.settings.silence_threshold
        );
        let command = self
            .base_command(&self.tools.ffmpeg_command)?
            .arg("-i")
            .arg(stretched)
            .arg("-af")
            .arg(filter)
            .args(["-loglevel", "info", "-y"])
            .arg(&output)
            .expects_output(&output)
            .removes_on_failure(&output);

        let trimmed_ok = match self.run_tool(session, stage, command).await {
            Ok(_) => self.validator.validate_async(output.clone()).await,
            Err(IngestError::Tool {
                source: ToolError::OutputMissing { .. },
                ..
            }) => false,
            Err(e) => return Err(e),
        };

        if trimmed_ok {
            if let Err(e) = tokio::fs::remove_file(stretched).await {
                tracing::warn!(path = %stretched.display(), error = %e, "Failed to remove stretched intermediate");
            }
            session.record_output(stage, output.clone());
            return Ok(output);
        }

        if !self.validator.validate_async(stretched.to_path_buf()).await {
            return Err(IngestError::InvalidArtifact {
                stage,
                path: output,
            });
        }

        tracing::warn!(
            request_id = %session.id(),
            fallback = %stretched.display(),
            "Silence trim produced no usable audio, using untrimmed input"
        );
        if let Err(e) = tokio::fs::remove_file(&output).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %output.display(), error = %e, "Failed to remove unusable trimmed output");
            }
        }
        session.record_output(stage, stretched.to_path_buf());
        Ok(stretched.to_path_buf())
    }

    /// Speech-to-text on `audio`; empty text is a failure
    pub async fn transcribe(&self, session: &mut RequestSession, audio: &Path) -> IngestResult<String> {
        let stage = PipelineStage::Transcription;
        let transcriber = Arc::clone(&self.transcriber);
        let path = audio.to_path_buf();
        let tool_timeout = self.settings.tool_timeouts.for_stage(stage);

        let text = self
            .pool
            .submit(
                "transcription",
                self.settings.deadlines.for_stage(stage),
                session.track(async move { transcriber.transcribe(&path, tool_timeout).await }),
            )
            .await
            .map_err(|e| pool_error(stage, e))?
            .map_err(|source| IngestError::Tool { stage, source })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(IngestError::EmptyResult(
                "transcription produced no text".to_string(),
            ));
        }

        let blob = TranscriptBlob {
            request_id: session.id(),
            source: audio,
            text: &text,
            created_at: chrono::Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&blob)
            .map_err(|e| IngestError::Internal(format!("Failed to encode transcript: {}", e)))?;
        tokio::fs::write(session.transcript_path(), bytes).await?;

        tracing::info!(
            request_id = %session.id(),
            transcriber = self.transcriber.name(),
            chars = text.len(),
            "Transcription complete"
        );
        Ok(text)
    }

    fn base_command(&self, argv: &[String]) -> IngestResult<ToolCommand> {
        ToolCommand::from_argv(argv)
            .ok_or_else(|| IngestError::Internal("tool command is not configured".to_string()))
    }

    /// Run `command` on the pool, tracked by `session` so teardown outlives it
    async fn run_tool(
        &self,
        session: &RequestSession,
        stage: PipelineStage,
        command: ToolCommand,
    ) -> IngestResult<PathBuf> {
        let request_id = session.id();
        let runner = self.runner.clone();
        let tool_timeout: Duration = self.settings.tool_timeouts.for_stage(stage);
        let deadline = self.settings.deadlines.for_stage(stage);

        tracing::debug!(request_id = %request_id, stage = %stage, command = %command.rendered(), "Submitting tool");

        self.pool
            .submit(
                &stage.to_string(),
                deadline,
                session.track(async move { runner.run(&command, tool_timeout).await }),
            )
            .await
            .map_err(|e| pool_error(stage, e))?
            .map_err(|source| IngestError::Tool { stage, source })
    }

    async fn require_valid(&self, stage: PipelineStage, path: &Path) -> IngestResult<()> {
        match self.validator.inspect_async(path.to_path_buf()).await {
            Ok(_) => Ok(()),
            Err(reason) => {
                tracing::warn!(stage = %stage, path = %path.display(), reason = %reason, "Stage produced invalid artifact");
                Err(IngestError::InvalidArtifact {
                    stage,
                    path: path.to_path_buf(),
                })
            }
        }
    }
}

fn file_stem(path: &Path) -> IngestResult<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IngestError::InputValidation(format!("No file name in {}", path.display())))
}

fn pool_error(stage: PipelineStage, error: PoolError) -> IngestError {
    match error {
        PoolError::DeadlineExceeded { deadline, .. } => IngestError::Timeout { stage, deadline },
        PoolError::Closed => IngestError::Unavailable("worker pool is shut down".to_string()),
        PoolError::WorkerLost { task } => IngestError::Internal(format!("worker lost {} task", task)),
    }
}
