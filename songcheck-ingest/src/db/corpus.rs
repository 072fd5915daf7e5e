//! Reference corpus access
//!
//! The corpus store is read-only from here. Documents always come back in id
//! order, so the content hash over them is stable between reads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::RwLock;

use songcheck_common::{Error, Result};

/// One accepted song in the reference corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: i64,
    pub lyrics: String,
    pub genre: Option<String>,
}

#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// All accepted documents, ordered by id
    async fn fetch_documents(&self) -> Result<Vec<CorpusDocument>>;
}

/// Corpus backed by the `songs` table
#[derive(Debug, Clone)]
pub struct SqliteCorpus {
    pool: SqlitePool,
}

impl SqliteCorpus {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CorpusSource for SqliteCorpus {
    async fn fetch_documents(&self) -> Result<Vec<CorpusDocument>> {
        let rows: Vec<(i64, String, Option<String>)> = sqlx::query_as(
            "SELECT id, COALESCE(lyrics, ''), genre FROM songs WHERE status = 'ACCEPTED' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(documents = rows.len(), "Fetched corpus documents");

        Ok(rows
            .into_iter()
            .map(|(id, lyrics, genre)| CorpusDocument { id, lyrics, genre })
            .collect())
    }
}

/// Corpus held in memory; used by tests and by callers without a database
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    documents: RwLock<Vec<CorpusDocument>>,
}

impl InMemoryCorpus {
    pub fn new(documents: Vec<CorpusDocument>) -> Self {
        let corpus = Self::default();
        corpus.replace(documents);
        corpus
    }

    /// Replace the whole corpus
    pub fn replace(&self, mut documents: Vec<CorpusDocument>) {
        documents.sort_by_key(|d| d.id);
        if let Ok(mut guard) = self.documents.write() {
            *guard = documents;
        }
    }

    pub fn push(&self, document: CorpusDocument) {
        if let Ok(mut guard) = self.documents.write() {
            guard.push(document);
            guard.sort_by_key(|d| d.id);
        }
    }
}

#[async_trait]
impl CorpusSource for InMemoryCorpus {
    async fn fetch_documents(&self) -> Result<Vec<CorpusDocument>> {
        self.documents
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| Error::Internal("in-memory corpus lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_corpus_returns_accepted_in_id_order() {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("songcheck.db")).await.unwrap();

        for (id, lyrics, genre, status) in [
            (3, Some("third song"), Some("rock"), "ACCEPTED"),
            (1, Some("first song"), None, "ACCEPTED"),
            (2, Some("pending song"), Some("pop"), "PENDING"),
            (4, None, Some("jazz"), "ACCEPTED"),
        ] {
            sqlx::query("INSERT INTO songs (id, lyrics, genre, status) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(lyrics)
                .bind(genre)
                .bind(status)
                .execute(&pool)
                .await
                .unwrap();
        }

        let documents = SqliteCorpus::new(pool).fetch_documents().await.unwrap();
        let ids: Vec<i64> = documents.iter().map(|d| d.id).collect();

        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(documents[1].genre.as_deref(), Some("rock"));
        assert_eq!(documents[2].lyrics, "");
    }

    #[tokio::test]
    async fn test_in_memory_corpus_sorts() {
        let corpus = InMemoryCorpus::new(vec![
            CorpusDocument {
                id: 2,
                lyrics: "b".to_string(),
                genre: None,
            },
            CorpusDocument {
                id: 1,
                lyrics: "a".to_string(),
                genre: None,
            },
        ]);

        let documents = corpus.fetch_documents().await.unwrap();
        assert_eq!(documents[0].id, 1);
    }
}
