//! Structural sanity check for audio artifacts
//!
//! Gates both the input and the output of every pipeline stage. Fails closed:
//! anything that cannot be proven usable is rejected, and checking never
//! raises.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::AudioArtifact;
use crate::utils::probe_audio;

/// Smallest accepted file size in bytes
pub const MIN_ARTIFACT_BYTES: u64 = 1024;

/// Shortest accepted decoded duration
pub const MIN_ARTIFACT_DURATION: Duration = Duration::from_millis(1000);

/// Why an artifact was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArtifactRejection {
    #[error("file does not exist")]
    Missing,
    #[error("file is {0} bytes, below the minimum")]
    TooSmall(u64),
    #[error("audio lasts {}ms, below the minimum", .0.as_millis())]
    TooShort(Duration),
    #[error("audio could not be decoded: {0}")]
    Undecodable(String),
}

#[derive(Debug, Clone)]
pub struct AudioValidator {
    min_bytes: u64,
    min_duration: Duration,
}

impl Default for AudioValidator {
    fn default() -> Self {
        Self {
            min_bytes: MIN_ARTIFACT_BYTES,
            min_duration: MIN_ARTIFACT_DURATION,
        }
    }
}

impl AudioValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure `path` and return it as an artifact if it is usable
    ///
    /// Size is checked before decoding so tiny files never reach symphonia.
    pub fn inspect(&self, path: &Path) -> Result<AudioArtifact, ArtifactRejection> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => return Err(ArtifactRejection::Missing),
        };

        let byte_size = metadata.len();
        if byte_size < self.min_bytes {
            return Err(ArtifactRejection::TooSmall(byte_size));
        }

        let probe = probe_audio(path).map_err(|e| ArtifactRejection::Undecodable(format!("{:#}", e)))?;
        if probe.duration < self.min_duration {
            return Err(ArtifactRejection::TooShort(probe.duration));
        }

        Ok(AudioArtifact {
            path: path.to_path_buf(),
            byte_size,
            decoded_duration: probe.duration,
        })
    }

    /// `true` if the artifact at `path` may be passed downstream
    pub fn validate(&self, path: &Path) -> bool {
        match self.inspect(path) {
            Ok(_) => true,
            Err(reason) => {
                tracing::debug!(path = %path.display(), reason = %reason, "Artifact rejected");
                false
            }
        }
    }

    /// [`inspect`](Self::inspect) on the blocking thread pool
    pub async fn inspect_async(&self, path: PathBuf) -> Result<AudioArtifact, ArtifactRejection> {
        let validator = self.clone();
        tokio::task::spawn_blocking(move || validator.inspect(&path))
            .await
            .unwrap_or_else(|e| Err(ArtifactRejection::Undecodable(format!("validation task failed: {}", e))))
    }

    /// [`validate`](Self::validate) on the blocking thread pool
    pub async fn validate_async(&self, path: PathBuf) -> bool {
        let validator = self.clone();
        tokio::task::spawn_blocking(move || validator.validate(&path))
            .await
            .unwrap_or(false)
    }
}
