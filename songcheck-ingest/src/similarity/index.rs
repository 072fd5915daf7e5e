//! Similarity index over the reference corpus
//!
//! Holds the current [`CorpusSnapshot`] behind a lock that is only ever held
//! to clone or swap an `Arc`, so readers see the old snapshot or the new one,
//! never a mix. Rebuilds are gated by the corpus content hash:
//!
//! 1. Fetch documents and hash them (blocking pool)
//! 2. Same hash as the current snapshot: return it untouched
//! 3. Otherwise take the rebuild lock and check again, since another caller
//!    may have rebuilt while this one waited
//! 4. Normalize, fit, persist (blocking pool), then swap
//!
//! At most one rebuild runs at a time and a given corpus version is fitted once.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::db::CorpusSource;
use crate::error::{IngestError, IngestResult};
use crate::services::{LanguageDetector, LanguageVerdict, Normalizer};

use super::snapshot::{corpus_hash, CorpusSnapshot, SnapshotSummary};
use super::snapshot_store::SnapshotStore;

/// Outcome of an explicit refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    #[serde(flatten)]
    pub snapshot: SnapshotSummary,
    /// Whether this refresh fitted a new vectorizer
    pub refitted: bool,
}

/// Why a text was not scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unscored {
    Empty,
    Unsupported(LanguageVerdict),
}

pub struct SimilarityIndex {
    corpus: Arc<dyn CorpusSource>,
    normalizer: Arc<dyn Normalizer>,
    detector: Arc<dyn LanguageDetector>,
    store: Option<SnapshotStore>,
    current: RwLock<Option<Arc<CorpusSnapshot>>>,
    rebuild_lock: Mutex<()>,
    refits: AtomicU64,
}

impl SimilarityIndex {
    pub fn new(
        corpus: Arc<dyn CorpusSource>,
        normalizer: Arc<dyn Normalizer>,
        detector: Arc<dyn LanguageDetector>,
        store: Option<SnapshotStore>,
    ) -> Self {
        Self {
            corpus,
            normalizer,
            detector,
            store,
            current: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            refits: AtomicU64::new(0),
        }
    }

    /// Seed the in-memory snapshot from the persisted cache, if any
    ///
    /// Returns whether a snapshot was loaded.
    pub async fn load_persisted(&self) -> bool {
        let Some(store) = self.store.clone() else {
            return false;
        };
        let loaded = tokio::task::spawn_blocking(move || store.load())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Similarity cache load task failed");
                None
            });

        match loaded {
            Some(snapshot) => {
                *self.current.write().await = Some(Arc::new(snapshot));
                true
            }
            None => false,
        }
    }

    /// Number of vectorizer fits since startup
    pub fn refit_count(&self) -> u64 {
        self.refits.load(Ordering::SeqCst)
    }

    /// Snapshot in memory right now, without checking the corpus
    pub async fn cached(&self) -> Option<Arc<CorpusSnapshot>> {
        self.current.read().await.clone()
    }

    pub fn normalizer(&self) -> &Arc<dyn Normalizer> {
        &self.normalizer
    }

    /// Current snapshot, rebuilt first if the corpus changed
    pub async fn get_snapshot(&self) -> IngestResult<Arc<CorpusSnapshot>> {
        self.refresh().await.map(|(snapshot, _)| snapshot)
    }

    /// Like [`get_snapshot`](Self::get_snapshot), reporting whether a refit happened
    pub async fn refresh_report(&self) -> IngestResult<RefreshReport> {
        let (snapshot, refitted) = self.refresh().await?;
        Ok(RefreshReport {
            snapshot: snapshot.summary(),
            refitted,
        })
    }

    async fn refresh(&self) -> IngestResult<(Arc<CorpusSnapshot>, bool)> {
        let documents = self.corpus.fetch_documents().await?;
        let texts: Vec<String> = documents.into_iter().map(|d| d.lyrics).collect();

        let (texts, hash) = tokio::task::spawn_blocking(move || {
            let hash = corpus_hash(&texts);
            (texts, hash)
        })
        .await
        .map_err(|e| IngestError::Internal(format!("Corpus hash task failed: {}", e)))?;

        if let Some(snapshot) = self.current_matching(&hash).await {
            tracing::debug!(hash = %hash, "Corpus unchanged, reusing similarity snapshot");
            return Ok((snapshot, false));
        }

        let _rebuild = self.rebuild_lock.lock().await;
        if let Some(snapshot) = self.current_matching(&hash).await {
            tracing::debug!(hash = %hash, "Snapshot rebuilt by another caller");
            return Ok((snapshot, false));
        }

        tracing::info!(hash = %hash, documents = texts.len(), "Corpus changed, rebuilding similarity index");

        let normalizer = Arc::clone(&self.normalizer);
        let store = self.store.clone();
        let snapshot = tokio::task::spawn_blocking(move || -> IngestResult<CorpusSnapshot> {
            let normalized: Vec<String> = texts.iter().map(|t| normalizer.normalize(t)).collect();
            let snapshot = CorpusSnapshot::fit(hash, &normalized)
                .map_err(|e| IngestError::Internal(format!("Snapshot construction failed: {}", e)))?;

            if let Some(store) = store {
                // The index stays usable in memory even if the cache can't be written
                if let Err(e) = store.save(&snapshot) {
                    tracing::warn!(error = %e, "Failed to persist similarity cache");
                }
            }
            Ok(snapshot)
        })
        .await
        .map_err(|e| IngestError::Internal(format!("Index rebuild task failed: {}", e)))??;

        self.refits.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = Some(Arc::clone(&snapshot));

        tracing::info!(
            hash = %snapshot.content_hash(),
            documents = snapshot.document_count(),
            vocabulary = snapshot.vectorizer().vocabulary_len(),
            "Similarity index rebuilt"
        );

        Ok((snapshot, true))
    }

    async fn current_matching(&self, hash: &str) -> Option<Arc<CorpusSnapshot>> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|s| s.content_hash() == hash)
            .cloned()
    }

    /// Screen raw text before scoring
    pub fn screen(&self, text: &str) -> Result<(), Unscored> {
        if text.trim().is_empty() {
            return Err(Unscored::Empty);
        }
        let verdict = self.detector.detect(text);
        if !verdict.is_supported() {
            return Err(Unscored::Unsupported(verdict));
        }
        Ok(())
    }

    /// Max cosine similarity of `text` to the corpus
    ///
    /// None if the text is empty or not English. 0.0 for an empty corpus.
    /// The match threshold is the caller's business.
    pub async fn score(&self, text: &str) -> IngestResult<Option<f32>> {
        if let Err(reason) = self.screen(text) {
            tracing::debug!(reason = ?reason, "Text not scored");
            return Ok(None);
        }

        let snapshot = self.get_snapshot().await?;
        let normalizer = Arc::clone(&self.normalizer);
        let text = text.to_string();

        let score = tokio::task::spawn_blocking(move || snapshot.score(&normalizer.normalize(&text)))
            .await
            .map_err(|e| IngestError::Internal(format!("Scoring task failed: {}", e)))?;

        Ok(Some(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CorpusDocument, InMemoryCorpus};
    use crate::services::{LyricNormalizer, ScriptLanguageDetector};

    fn doc(id: i64, lyrics: &str) -> CorpusDocument {
        CorpusDocument {
            id,
            lyrics: lyrics.to_string(),
            genre: None,
        }
    }

    fn index_over(corpus: Arc<InMemoryCorpus>) -> SimilarityIndex {
        SimilarityIndex::new(
            corpus,
            Arc::new(LyricNormalizer::new()),
            Arc::new(ScriptLanguageDetector::new()),
            None,
        )
    }

    #[tokio::test]
    async fn test_unchanged_corpus_does_not_refit() {
        let corpus = Arc::new(InMemoryCorpus::new(vec![doc(1, "sunshine morning")]));
        let index = index_over(corpus);

        let first = index.get_snapshot().await.unwrap();
        let second = index.get_snapshot().await.unwrap();

        assert_eq!(index.refit_count(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_changed_corpus_refits_once() {
        let corpus = Arc::new(InMemoryCorpus::new(vec![doc(1, "sunshine morning")]));
        let index = index_over(Arc::clone(&corpus));
        index.get_snapshot().await.unwrap();

        corpus.push(doc(2, "midnight rain"));
        let report = index.refresh_report().await.unwrap();

        assert!(report.refitted);
        assert_eq!(report.snapshot.document_count, 2);
        assert_eq!(index.refit_count(), 2);
        assert!(!index.refresh_report().await.unwrap().refitted);
    }

    #[tokio::test]
    async fn test_score_rejects_empty_and_foreign_text() {
        let corpus = Arc::new(InMemoryCorpus::new(vec![doc(1, "sunshine morning")]));
        let index = index_over(corpus);

        assert_eq!(index.score("   ").await.unwrap(), None);
        assert_eq!(index.score("사랑해 너를\n보고 싶어").await.unwrap(), None);
        assert_eq!(index.refit_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_corpus_scores_zero() {
        let index = index_over(Arc::new(InMemoryCorpus::default()));
        assert_eq!(index.score("sunshine morning").await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_persisted_snapshot_avoids_refit() {
        let dir = tempfile::TempDir::new().unwrap();
        let corpus = Arc::new(InMemoryCorpus::new(vec![doc(1, "sunshine morning")]));

        let first = SimilarityIndex::new(
            Arc::clone(&corpus) as Arc<dyn CorpusSource>,
            Arc::new(LyricNormalizer::new()),
            Arc::new(ScriptLanguageDetector::new()),
            Some(SnapshotStore::new(dir.path())),
        );
        first.get_snapshot().await.unwrap();

        let second = SimilarityIndex::new(
            corpus,
            Arc::new(LyricNormalizer::new()),
            Arc::new(ScriptLanguageDetector::new()),
            Some(SnapshotStore::new(dir.path())),
        );
        assert!(second.load_persisted().await);
        second.get_snapshot().await.unwrap();

        assert_eq!(second.refit_count(), 0);
    }
}
