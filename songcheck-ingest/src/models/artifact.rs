//! Audio artifact produced or consumed by a pipeline stage

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// A file that passed validation
///
/// Only the validator constructs these, so holding one means the file was
/// at least 1 KiB and decoded to at least one second of audio when checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub byte_size: u64,
    #[serde(with = "duration_millis")]
    pub decoded_duration: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
