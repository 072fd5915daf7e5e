//! Genre classification
//!
//! Nearest-centroid classifier in TF-IDF space: each genre is the normalized
//! mean of its documents' rows, and a query is assigned to the centroid with
//! the highest cosine similarity. Trained from labelled corpus rows and stored
//! as a single JSON file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use songcheck_common::{Error, Result};

use super::tfidf::{cosine_similarity, SparseVector, TfidfVectorizer};

/// Canonical label: lowercase, `-` and spaces become `_`
pub fn normalize_genre_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreCentroid {
    pub genre: String,
    pub documents: usize,
    pub vector: SparseVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenrePrediction {
    pub genre: String,
    /// Cosine similarity to the winning centroid
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreModel {
    vectorizer: TfidfVectorizer,
    centroids: Vec<GenreCentroid>,
    trained_at: DateTime<Utc>,
}

impl GenreModel {
    /// Train on `(normalized text, label)` pairs
    ///
    /// Blank labels and blank texts are skipped. None if nothing is left.
    pub fn fit<S: AsRef<str>, L: AsRef<str>>(samples: &[(S, L)]) -> Option<Self> {
        let usable: Vec<(&str, String)> = samples
            .iter()
            .map(|(text, label)| (text.as_ref(), normalize_genre_label(label.as_ref())))
            .filter(|(text, label)| !text.trim().is_empty() && !label.is_empty())
            .collect();
        if usable.is_empty() {
            return None;
        }

        let texts: Vec<&str> = usable.iter().map(|(text, _)| *text).collect();
        let (vectorizer, matrix) = TfidfVectorizer::fit_transform(&texts);

        let mut sums: BTreeMap<&str, (usize, BTreeMap<u32, f32>)> = BTreeMap::new();
        for ((_, label), row) in usable.iter().zip(matrix.rows()) {
            let (count, weights) = sums.entry(label.as_str()).or_default();
            *count += 1;
            for (index, value) in row.indices.iter().zip(&row.values) {
                *weights.entry(*index).or_default() += value;
            }
        }

        let centroids = sums
            .into_iter()
            .map(|(genre, (documents, weights))| GenreCentroid {
                genre: genre.to_string(),
                documents,
                vector: SparseVector::from_pairs(weights.into_iter().collect()).l2_normalized(),
            })
            .collect();

        Some(Self {
            vectorizer,
            centroids,
            trained_at: Utc::now(),
        })
    }

    /// Closest genre for normalized `text`; None if it shares no terms with the model
    pub fn predict(&self, normalized: &str) -> Option<GenrePrediction> {
        let query = self.vectorizer.transform(normalized);
        if query.is_empty() {
            return None;
        }

        self.centroids
            .iter()
            .map(|c| (c, cosine_similarity(&c.vector, &query)))
            .filter(|(_, score)| *score > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(centroid, confidence)| GenrePrediction {
                genre: centroid.genre.clone(),
                confidence,
            })
    }

    pub fn genres(&self) -> Vec<&str> {
        self.centroids.iter().map(|c| c.genre.as_str()).collect()
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Blocking
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| Error::Serialization(format!("genre model: {}", e)))?;
        songcheck_common::fs::write_atomic(path, &bytes)
    }

    /// Blocking; Ok(None) if no model has been saved
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let model: Self = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))?;
        if !model.vectorizer.is_consistent() {
            return Err(Error::Serialization(format!(
                "{}: inconsistent vectorizer",
                path.display()
            )));
        }
        Ok(Some(model))
    }
}
