//! Configuration for songcheck-ingest
//!
//! Bootstrap TOML only: everything is read once at startup. Every field has a
//! compiled default, so an absent file or a partial file is valid.
//!
//! ```toml
//! root_folder = "/srv/songcheck"
//!
//! [logging]
//! level = "info"
//!
//! [pipeline]
//! speed_factor = 0.85
//! max_concurrent_pipelines = 2
//!
//! [tools]
//! separation_command = ["demucs"]
//! ffmpeg_command = ["ffmpeg"]
//! transcriber_command = ["whisper-transcribe", "--model", "small.en"]
//! ```

use serde::{Deserialize, Serialize};
use songcheck_common::config::{LoggingConfig, RootFolderInitializer, RootFolderResolver};
use songcheck_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::PipelineStage;

/// Module name used for config file lookup and logging
pub const MODULE_NAME: &str = "songcheck-ingest";

/// Maximum accepted upload size (100 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Root folder; scratch, cache and database default to children of it
    pub root_folder: Option<PathBuf>,
    pub scratch_root: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub genre_model_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub pipeline: PipelineSettings,
    pub tools: ToolSettings,
    pub normalizer: NormalizerSettings,
}

/// `[pipeline]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// atempo factor applied to isolated vocals
    pub speed_factor: f32,
    /// silenceremove stop_threshold
    pub silence_threshold: String,
    /// silenceremove stop_duration (seconds)
    pub min_silence_duration: String,
    /// Score at or above which a song counts as a duplicate
    pub match_threshold: f32,
    /// Score at or below which user lyrics do not match their audio
    pub compare_threshold: f32,
    /// Concurrency gate capacity
    pub max_concurrent_pipelines: usize,
    /// Upper bound on worker pool size (actual size is min(this, cores))
    pub max_workers: usize,
    pub max_upload_bytes: u64,
    /// Timeouts enforced by the tool runner on the process itself
    pub tool_timeouts: StageTimeouts,
    /// Outer deadlines on worker pool submissions (queue wait included)
    pub deadlines: StageTimeouts,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            speed_factor: 0.85,
            silence_threshold: "-30dB".to_string(),
            min_silence_duration: "1.0".to_string(),
            match_threshold: 0.75,
            compare_threshold: 0.5,
            max_concurrent_pipelines: 2,
            max_workers: 2,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            tool_timeouts: StageTimeouts::default(),
            deadlines: StageTimeouts::default(),
        }
    }
}

/// Per-stage time limits in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub separation_secs: u64,
    pub tempo_secs: u64,
    pub silence_secs: u64,
    pub transcription_secs: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            separation_secs: 600,
            tempo_secs: 300,
            silence_secs: 300,
            transcription_secs: 600,
        }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: PipelineStage) -> Duration {
        let secs = match stage {
            PipelineStage::Separation => self.separation_secs,
            PipelineStage::Tempo => self.tempo_secs,
            PipelineStage::SilenceTrim => self.silence_secs,
            PipelineStage::Transcription => self.transcription_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Container format requested from the separation tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeparationFormat {
    Mp3,
    Wav,
}

impl SeparationFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SeparationFormat::Mp3 => "mp3",
            SeparationFormat::Wav => "wav",
        }
    }
}

/// `[tools]` section
///
/// Commands are argument vectors: the first element is the program, the rest
/// are leading arguments placed before the stage's own arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub separation_command: Vec<String>,
    pub separation_model: String,
    pub separation_device: String,
    pub separation_format: SeparationFormat,
    pub ffmpeg_command: Vec<String>,
    pub transcriber_command: Vec<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            separation_command: vec!["demucs".to_string()],
            separation_model: "htdemucs".to_string(),
            separation_device: "cpu".to_string(),
            separation_format: SeparationFormat::Mp3,
            ffmpeg_command: vec!["ffmpeg".to_string()],
            transcriber_command: vec![
                "whisper-transcribe".to_string(),
                "--model".to_string(),
                "small.en".to_string(),
            ],
        }
    }
}

/// `[normalizer]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    /// `short=full` lines applied before generic contraction expansion
    pub contractions_file: Option<PathBuf>,
    /// One word or phrase per line, removed from lyrics
    pub remove_file: Option<PathBuf>,
}

/// Filesystem locations after root folder resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPaths {
    pub root_folder: PathBuf,
    pub scratch_root: PathBuf,
    pub cache_dir: PathBuf,
    pub database_path: PathBuf,
    pub genre_model_path: PathBuf,
}

impl IngestConfig {
    /// Load from TOML; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = songcheck_common::config::load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if !(0.5..=2.0).contains(&p.speed_factor) {
            return Err(Error::Config(format!(
                "speed_factor must be within [0.5, 2.0] (atempo range), got {}",
                p.speed_factor
            )));
        }
        if p.max_concurrent_pipelines == 0 || p.max_workers == 0 {
            return Err(Error::Config(
                "max_concurrent_pipelines and max_workers must be at least 1".to_string(),
            ));
        }
        for (name, command) in [
            ("separation_command", &self.tools.separation_command),
            ("ffmpeg_command", &self.tools.ffmpeg_command),
            ("transcriber_command", &self.tools.transcriber_command),
        ] {
            if command.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(Error::Config(format!("{} must name a program", name)));
            }
        }
        Ok(())
    }

    /// Resolve the root folder (CLI → ENV → TOML → default) and derive paths
    pub fn resolve_paths(&self, cli_root: Option<PathBuf>) -> ResolvedPaths {
        let root_folder = RootFolderResolver::new(MODULE_NAME)
            .with_cli_arg(cli_root)
            .with_toml_root(self.root_folder.clone())
            .resolve();
        let root = RootFolderInitializer::new(root_folder.clone());

        ResolvedPaths {
            scratch_root: self
                .scratch_root
                .clone()
                .unwrap_or_else(|| root.child("scratch")),
            cache_dir: self.cache_dir.clone().unwrap_or_else(|| root.child("cache")),
            database_path: self
                .database_path
                .clone()
                .unwrap_or_else(|| root.child("songcheck.db")),
            genre_model_path: self
                .genre_model_path
                .clone()
                .unwrap_or_else(|| root.child("genre_model.json")),
            root_folder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_pipeline() {
        let config = IngestConfig::default();
        assert_eq!(config.pipeline.speed_factor, 0.85);
        assert_eq!(config.pipeline.match_threshold, 0.75);
        assert_eq!(config.pipeline.max_concurrent_pipelines, 2);
        assert_eq!(config.pipeline.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(
            config.pipeline.deadlines.for_stage(PipelineStage::Separation),
            Duration::from_secs(600)
        );
        assert_eq!(
            config.pipeline.deadlines.for_stage(PipelineStage::SilenceTrim),
            Duration::from_secs(300)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: IngestConfig = toml::from_str(
            r#"
            [pipeline]
            speed_factor = 0.9

            [tools]
            separation_format = "wav"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.speed_factor, 0.9);
        assert_eq!(config.pipeline.silence_threshold, "-30dB");
        assert_eq!(config.tools.separation_format, SeparationFormat::Wav);
        assert_eq!(config.tools.ffmpeg_command, vec!["ffmpeg".to_string()]);
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config = IngestConfig::default();
        config.tools.ffmpeg_command.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_speed() {
        let mut config = IngestConfig::default();
        config.pipeline.speed_factor = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_paths_override_root_children() {
        let config = IngestConfig {
            scratch_root: Some(PathBuf::from("/tmp/scratch-override")),
            ..Default::default()
        };
        let paths = config.resolve_paths(Some(PathBuf::from("/tmp/songcheck-root")));

        assert_eq!(paths.root_folder, PathBuf::from("/tmp/songcheck-root"));
        assert_eq!(paths.scratch_root, PathBuf::from("/tmp/scratch-override"));
        assert_eq!(paths.cache_dir, PathBuf::from("/tmp/songcheck-root/cache"));
        assert_eq!(
            paths.database_path,
            PathBuf::from("/tmp/songcheck-root/songcheck.db")
        );
    }
}
