//! Term-frequency / inverse-document-frequency vectors
//!
//! Tokens are runs of two or more word characters. The vocabulary is sorted
//! lexicographically, idf is smoothed (`ln((1 + n) / (1 + df)) + 1`), and
//! every row is L2-normalized, so cosine similarity between two rows is a
//! sparse dot product.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

/// Lowercased tokens of `text`
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Sparse row: strictly increasing `indices` paired with `values`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Build from unordered `(index, value)` pairs, dropping zeros
    pub fn from_pairs(mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_by_key(|(index, _)| *index);
        let mut vector = Self::default();
        for (index, value) in pairs {
            if value == 0.0 {
                continue;
            }
            if vector.indices.last() == Some(&index) {
                if let Some(last) = vector.values.last_mut() {
                    *last += value;
                }
            } else {
                vector.indices.push(index);
                vector.values.push(value);
            }
        }
        vector
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Scale to unit length; a zero vector stays zero
    pub fn l2_normalized(mut self) -> Self {
        let norm = self.norm();
        if norm > 0.0 {
            for value in &mut self.values {
                *value /= norm;
            }
        }
        self
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Largest index + 1, or 0 for an empty vector
    pub fn min_width(&self) -> usize {
        self.indices.last().map_or(0, |i| *i as usize + 1)
    }

    /// Structural invariant: sorted, unique, same length as values
    pub fn is_well_formed(&self) -> bool {
        self.indices.len() == self.values.len()
            && self.indices.windows(2).all(|w| w[0] < w[1])
    }
}

/// Cosine similarity clamped to [0, 1]; 0 when either side is zero
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f32 {
    let denominator = a.norm() * b.norm();
    if denominator == 0.0 {
        return 0.0;
    }
    (a.dot(b) / denominator).clamp(0.0, 1.0)
}

/// Fitted vocabulary and idf weights
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    /// Learn vocabulary and idf from `documents`
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();

        let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            let unique: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let n = documents.len() as f32;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(document_frequency.len());
        for (index, (term, df)) in document_frequency.into_iter().enumerate() {
            vocabulary.insert(term.to_string(), index as u32);
            idf.push(((1.0 + n) / (1.0 + df as f32)).ln() + 1.0);
        }

        Self { vocabulary, idf }
    }

    /// Fit and vectorize the same documents
    pub fn fit_transform<S: AsRef<str>>(documents: &[S]) -> (Self, TfidfMatrix) {
        let vectorizer = Self::fit(documents);
        let rows = documents.iter().map(|d| vectorizer.transform(d.as_ref())).collect();
        let matrix = TfidfMatrix {
            width: vectorizer.vocabulary_len(),
            rows,
        };
        (vectorizer, matrix)
    }

    /// Vectorize against the fitted vocabulary; unknown terms are ignored
    pub fn transform(&self, document: &str) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in tokenize(document) {
            if let Some(&index) = self.vocabulary.get(&token) {
                *counts.entry(index).or_default() += 1.0;
            }
        }
        let pairs = counts
            .into_iter()
            .map(|(index, count)| (index, count * self.idf[index as usize]))
            .collect();
        SparseVector::from_pairs(pairs).l2_normalized()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn term_index(&self, term: &str) -> Option<u32> {
        self.vocabulary.get(term).copied()
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.term_index(term).map(|i| self.idf[i as usize])
    }

    /// Vocabulary indices are exactly 0..len and idf has one weight per term
    pub fn is_consistent(&self) -> bool {
        self.idf.len() == self.vocabulary.len()
            && self
                .vocabulary
                .values()
                .all(|&i| (i as usize) < self.vocabulary.len())
    }
}

/// Document-term matrix, one L2-normalized row per corpus document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfidfMatrix {
    width: usize,
    rows: Vec<SparseVector>,
}

impl TfidfMatrix {
    pub fn new(width: usize, rows: Vec<SparseVector>) -> Self {
        Self { width, rows }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[SparseVector] {
        &self.rows
    }

    /// Highest similarity of `query` to any row; 0.0 for an empty matrix
    pub fn max_similarity(&self, query: &SparseVector) -> f32 {
        self.rows
            .iter()
            .map(|row| cosine_similarity(row, query))
            .fold(0.0, f32::max)
    }

    /// Every row is well formed and fits inside `width`
    pub fn is_consistent(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.is_well_formed() && row.min_width() <= self.width)
    }
}

/// Similarity of two texts in a space fitted on just the pair
pub fn pairwise_similarity(a: &str, b: &str) -> f32 {
    let (_, matrix) = TfidfVectorizer::fit_transform(&[a, b]);
    cosine_similarity(&matrix.rows[0], &matrix.rows[1])
}
