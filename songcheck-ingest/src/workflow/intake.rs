//! Upload intake
//!
//! Rejects anything that is not an `.mp3`/`.wav` of at most the configured
//! size before a session or any pipeline work exists.

use std::path::{Path, PathBuf};

use crate::error::{IngestError, IngestResult};
use crate::models::RequestSession;

const ALLOWED_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// A client upload held in memory
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UploadIntake {
    max_bytes: u64,
}

impl UploadIntake {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validate name and size; returns the name to store under
    pub fn check(&self, filename: &str, size: u64) -> IngestResult<String> {
        let name = sanitize_filename(filename).ok_or_else(|| {
            IngestError::InputValidation(format!("Invalid file name: {:?}", filename))
        })?;

        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
            _ => {
                return Err(IngestError::InputValidation(format!(
                    "Invalid file type: {} (only .mp3 and .wav are accepted)",
                    name
                )))
            }
        }

        if size == 0 {
            return Err(IngestError::InputValidation("Uploaded file is empty".to_string()));
        }
        if size > self.max_bytes {
            return Err(IngestError::InputValidation(format!(
                "File is {} bytes, over the {} byte limit",
                size, self.max_bytes
            )));
        }

        Ok(name)
    }

    /// Read a local file as an upload, checking its size before reading it
    pub async fn read_file(&self, path: &Path) -> IngestResult<UploadedFile> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            IngestError::InputValidation(format!("Cannot read {}: {}", path.display(), e))
        })?;
        self.check(&filename, metadata.len())?;

        let bytes = tokio::fs::read(path).await?;
        Ok(UploadedFile { filename, bytes })
    }

    /// Validate `upload` and write it into the session directory
    pub async fn store(&self, session: &RequestSession, upload: UploadedFile) -> IngestResult<PathBuf> {
        let name = self.check(&upload.filename, upload.len())?;
        let path = session.upload_path(&name);
        tokio::fs::write(&path, &upload.bytes).await?;

        tracing::info!(
            request_id = %session.id(),
            file = %name,
            bytes = upload.len(),
            "Upload stored"
        );
        Ok(path)
    }
}

/// Final path component of a client-supplied name, either separator style
fn sanitize_filename(filename: &str) -> Option<String> {
    let name = filename.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_check_is_case_insensitive() {
        let intake = UploadIntake::new(1024);
        assert_eq!(intake.check("Song.MP3", 10).unwrap(), "Song.MP3");
        assert_eq!(intake.check("take.wav", 10).unwrap(), "take.wav");
        assert!(intake.check("notes.txt", 10).is_err());
        assert!(intake.check("noextension", 10).is_err());
    }

    #[test]
    fn test_size_limit() {
        let intake = UploadIntake::new(100);
        assert!(intake.check("a.wav", 100).is_ok());
        let err = intake.check("a.wav", 101).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::InputValidation);
        assert!(intake.check("a.wav", 0).is_err());
    }

    #[test]
    fn test_path_components_are_stripped() {
        let intake = UploadIntake::new(100);
        assert_eq!(intake.check("../../etc/evil.wav", 1).unwrap(), "evil.wav");
        assert_eq!(intake.check("C:\\music\\track.mp3", 1).unwrap(), "track.mp3");
        assert!(intake.check("uploads/..", 1).is_err());
        assert!(intake.check("dir/", 1).is_err());
    }

    #[tokio::test]
    async fn test_store_writes_into_session() {
        let scratch = tempfile::TempDir::new().unwrap();
        let mut session = RequestSession::create(scratch.path()).await.unwrap();
        let intake = UploadIntake::new(1024);

        let path = intake
            .store(&session, UploadedFile::new("nested/song.wav", vec![1, 2, 3]))
            .await
            .unwrap();

        assert_eq!(path, session.root_dir().join("song.wav"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        session.teardown().await.unwrap();
    }
}
