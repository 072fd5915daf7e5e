//! Database access for songcheck-ingest
//!
//! The reference corpus lives in the `songs` table of a SQLite database.

pub mod corpus;

pub use corpus::{CorpusDocument, CorpusSource, InMemoryCorpus, SqliteCorpus};

use songcheck_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the database file and the `songs` table if they don't exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id INTEGER PRIMARY KEY,
            title TEXT,
            artist TEXT,
            lyrics TEXT,
            genre TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_status ON songs(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (songs)");

    Ok(())
}
