//! Immutable version of the similarity index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::tfidf::{TfidfMatrix, TfidfVectorizer};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("matrix width {matrix_width} does not match vocabulary size {vocabulary}")]
    WidthMismatch { matrix_width: usize, vocabulary: usize },

    #[error("vectorizer vocabulary and idf weights disagree")]
    InconsistentVectorizer,

    #[error("matrix rows are malformed or exceed the matrix width")]
    InconsistentMatrix,
}

/// Content hash of the corpus: SHA-256 (hex) over the texts in order
///
/// Each text is followed by a NUL byte so that moving text across a document
/// boundary changes the hash.
pub fn corpus_hash<S: AsRef<str>>(texts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for text in texts {
        hasher.update(text.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Vectorizer and matrix fitted from one version of the corpus
///
/// Constructed only through [`CorpusSnapshot::new`], which guarantees the
/// matrix and vocabulary belong together.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusSnapshot {
    content_hash: String,
    vectorizer: TfidfVectorizer,
    matrix: TfidfMatrix,
    built_at: DateTime<Utc>,
}

impl CorpusSnapshot {
    pub fn new(
        content_hash: String,
        vectorizer: TfidfVectorizer,
        matrix: TfidfMatrix,
        built_at: DateTime<Utc>,
    ) -> Result<Self, SnapshotError> {
        if !vectorizer.is_consistent() {
            return Err(SnapshotError::InconsistentVectorizer);
        }
        if matrix.width() != vectorizer.vocabulary_len() {
            return Err(SnapshotError::WidthMismatch {
                matrix_width: matrix.width(),
                vocabulary: vectorizer.vocabulary_len(),
            });
        }
        if !matrix.is_consistent() {
            return Err(SnapshotError::InconsistentMatrix);
        }
        Ok(Self {
            content_hash,
            vectorizer,
            matrix,
            built_at,
        })
    }

    /// Fit a snapshot over already-normalized documents
    pub fn fit<S: AsRef<str>>(content_hash: String, normalized: &[S]) -> Result<Self, SnapshotError> {
        let (vectorizer, matrix) = TfidfVectorizer::fit_transform(normalized);
        Self::new(content_hash, vectorizer, matrix, Utc::now())
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    pub fn matrix(&self) -> &TfidfMatrix {
        &self.matrix
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn document_count(&self) -> usize {
        self.matrix.row_count()
    }

    /// Max cosine similarity of normalized `text` to any corpus document
    pub fn score(&self, normalized: &str) -> f32 {
        let query = self.vectorizer.transform(normalized);
        self.matrix.max_similarity(&query)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            content_hash: self.content_hash.clone(),
            document_count: self.document_count(),
            vocabulary_size: self.vectorizer.vocabulary_len(),
            built_at: self.built_at,
        }
    }
}

/// Descriptive fields of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub content_hash: String,
    pub document_count: usize,
    pub vocabulary_size: usize,
    pub built_at: DateTime<Utc>,
}
