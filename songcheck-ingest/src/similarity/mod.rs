//! Fingerprinting and comparison of normalized lyric text

pub mod genre_model;
pub mod index;
pub mod snapshot;
pub mod snapshot_store;
pub mod tfidf;

pub use genre_model::{normalize_genre_label, GenreModel, GenrePrediction};
pub use index::{RefreshReport, SimilarityIndex, Unscored};
pub use snapshot::{corpus_hash, CorpusSnapshot, SnapshotError, SnapshotSummary};
pub use snapshot_store::SnapshotStore;
pub use tfidf::{cosine_similarity, pairwise_similarity, SparseVector, TfidfMatrix, TfidfVectorizer};
