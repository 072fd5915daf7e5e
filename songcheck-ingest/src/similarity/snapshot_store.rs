//! Durable cache of the similarity index
//!
//! Three JSON files in the cache directory:
//! - `similarity_vectorizer.json`
//! - `similarity_matrix.json`
//! - `corpus_hash.json` (hash, build time, document count)
//!
//! Each file is written atomically. On save the hash file is removed first and
//! written last, so a crash mid-save leaves no hash and the cache reads as
//! "never built" rather than pairing a new matrix with an old hash.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use songcheck_common::{Error, Result};

use super::snapshot::CorpusSnapshot;
use super::tfidf::{TfidfMatrix, TfidfVectorizer};

const VECTORIZER_FILE: &str = "similarity_vectorizer.json";
const MATRIX_FILE: &str = "similarity_matrix.json";
const HASH_FILE: &str = "corpus_hash.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HashEntry {
    content_hash: String,
    built_at: DateTime<Utc>,
    document_count: usize,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Persist `snapshot`, replacing whatever was stored
    ///
    /// Blocking; call from `spawn_blocking`.
    pub fn save(&self, snapshot: &CorpusSnapshot) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        songcheck_common::fs::remove_path(&self.path(HASH_FILE))?;

        write_json(&self.path(VECTORIZER_FILE), snapshot.vectorizer())?;
        write_json(&self.path(MATRIX_FILE), snapshot.matrix())?;
        write_json(
            &self.path(HASH_FILE),
            &HashEntry {
                content_hash: snapshot.content_hash().to_string(),
                built_at: snapshot.built_at(),
                document_count: snapshot.document_count(),
            },
        )?;

        tracing::debug!(
            dir = %self.dir.display(),
            hash = %snapshot.content_hash(),
            "Similarity cache persisted"
        );
        Ok(())
    }

    /// Load the stored snapshot
    ///
    /// A missing hash file means the cache was never built (None). Unreadable
    /// or inconsistent entries are logged and also treated as absent.
    pub fn load(&self) -> Option<CorpusSnapshot> {
        let hash_path = self.path(HASH_FILE);
        if !hash_path.exists() {
            tracing::debug!(dir = %self.dir.display(), "No persisted similarity cache");
            return None;
        }

        match self.try_load(&hash_path) {
            Ok(snapshot) => {
                tracing::info!(
                    hash = %snapshot.content_hash(),
                    documents = snapshot.document_count(),
                    "Loaded persisted similarity cache"
                );
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Ignoring unreadable similarity cache"
                );
                None
            }
        }
    }

    fn try_load(&self, hash_path: &Path) -> Result<CorpusSnapshot> {
        let entry: HashEntry = read_json(hash_path)?;
        let vectorizer: TfidfVectorizer = read_json(&self.path(VECTORIZER_FILE))?;
        let matrix: TfidfMatrix = read_json(&self.path(MATRIX_FILE))?;

        if matrix.row_count() != entry.document_count {
            return Err(Error::Serialization(format!(
                "matrix has {} rows but hash entry records {} documents",
                matrix.row_count(),
                entry.document_count
            )));
        }

        CorpusSnapshot::new(entry.content_hash, vectorizer, matrix, entry.built_at)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Remove every cache file
    pub fn clear(&self) -> Result<()> {
        for name in [HASH_FILE, VECTORIZER_FILE, MATRIX_FILE] {
            songcheck_common::fs::remove_path(&self.path(name))?;
        }
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))?;
    songcheck_common::fs::write_atomic(path, &bytes)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))
}
