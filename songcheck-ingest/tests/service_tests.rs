//! End-to-end service tests
//!
//! Audio in, report out, with stub tools and both corpus backends.

#![cfg(unix)]

mod helpers;

use std::sync::Arc;

use songcheck_ingest::db::{init_database_pool, CorpusSource, InMemoryCorpus, SqliteCorpus};
use songcheck_ingest::workflow::UploadedFile;
use songcheck_ingest::{ErrorCategory, IngestService, ServiceContext, SongInput};
use tempfile::TempDir;

use helpers::audio_generator::tone_bytes;
use helpers::fake_tools::FakeTools;
use helpers::{doc, entry_count, start_service};

const TRANSCRIPT: &str = "The days are getting better on top, family good and weather good";

fn upload() -> UploadedFile {
    UploadedFile::new("song.mp3", tone_bytes(2.0))
}

#[tokio::test]
async fn test_audio_duplicate_is_detected() {
    let root = TempDir::new().unwrap();
    let tools = FakeTools::new(root.path(), TRANSCRIPT);
    let corpus = Arc::new(InMemoryCorpus::new(vec![
        doc(1, "Days are getting better, on top! Family good, weather good", Some("pop")),
        doc(2, "highway engine roaring through desert night", Some("rock")),
    ]));
    let service = start_service(root.path(), &tools, corpus).await;

    let report = service.check_similarity(SongInput::Audio(upload())).await.unwrap();

    assert!(report.is_match, "score was {}", report.score);
    assert!(report.request_id.is_some());
    assert_eq!(report.lyrics, TRANSCRIPT);
    assert_eq!(entry_count(&service.paths().scratch_root), 0);
}

#[tokio::test]
async fn test_compare_matching_lyrics() {
    let root = TempDir::new().unwrap();
    let tools = FakeTools::new(root.path(), TRANSCRIPT);
    let service = start_service(root.path(), &tools, Arc::new(InMemoryCorpus::new(Vec::new()))).await;

    let report = service
        .compare_lyrics(upload(), "[Verse]\nthe days are getting BETTER on top\nfamily good, weather good")
        .await
        .unwrap();

    assert!(report.score > 0.9, "score was {}", report.score);
    assert!(!report.is_not_match);
    assert_eq!(report.threshold, 0.5);
}

#[tokio::test]
async fn test_compare_different_lyrics() {
    let root = TempDir::new().unwrap();
    let tools = FakeTools::new(root.path(), TRANSCRIPT);
    let service = start_service(root.path(), &tools, Arc::new(InMemoryCorpus::new(Vec::new()))).await;

    let report = service
        .compare_lyrics(upload(), "midnight train rolling past the empty station")
        .await
        .unwrap();

    assert!(report.is_not_match);
    assert_eq!(report.transcript, TRANSCRIPT);
}

#[tokio::test]
async fn test_compare_rejects_blank_lyrics_before_pipeline() {
    let root = TempDir::new().unwrap();
    let tools = FakeTools::new(root.path(), TRANSCRIPT);
    let service = start_service(root.path(), &tools, Arc::new(InMemoryCorpus::new(Vec::new()))).await;

    let err = service.compare_lyrics(upload(), "  \n").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::InputValidation);
    assert_eq!(tools.calls("demucs"), 0);
}

#[tokio::test]
async fn test_failure_report_shape() {
    let root = TempDir::new().unwrap();
    let tools = FakeTools::new(root.path(), TRANSCRIPT);
    let service = start_service(root.path(), &tools, Arc::new(InMemoryCorpus::new(Vec::new()))).await;

    let err = service
        .transcribe(UploadedFile::new("notes.txt", b"hello".to_vec()))
        .await
        .unwrap_err();
    let json = serde_json::to_value(err.report()).unwrap();

    assert_eq!(json["error"]["category"], "INPUT_VALIDATION");
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert!(json["error"]["message"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn test_sqlite_corpus_only_reads_accepted_songs() {
    let root = TempDir::new().unwrap();
    let pool = init_database_pool(&root.path().join("songs.db")).await.unwrap();

    for (lyrics, genre, status) in [
        ("first accepted song", Some("pop"), "ACCEPTED"),
        ("still pending song", None, "PENDING"),
        ("second accepted song", None, "ACCEPTED"),
    ] {
        sqlx::query("INSERT INTO songs (lyrics, genre, status) VALUES (?, ?, ?)")
            .bind(lyrics)
            .bind(genre)
            .bind(status)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO songs (lyrics, status) VALUES (NULL, 'ACCEPTED')")
        .execute(&pool)
        .await
        .unwrap();

    let documents = SqliteCorpus::new(pool).fetch_documents().await.unwrap();

    let lyrics: Vec<&str> = documents.iter().map(|d| d.lyrics.as_str()).collect();
    assert_eq!(lyrics, vec!["first accepted song", "second accepted song", ""]);
    assert_eq!(documents[0].genre.as_deref(), Some("pop"));
}

#[tokio::test]
async fn test_service_from_config_uses_database_corpus() {
    let root = TempDir::new().unwrap();
    let tools = FakeTools::new(root.path(), TRANSCRIPT);
    let (config, paths) = tools.config(root.path());

    let pool = init_database_pool(&paths.database_path).await.unwrap();
    sqlx::query("INSERT INTO songs (title, lyrics, status) VALUES ('Better', ?, 'ACCEPTED')")
        .bind("day get better top good famili good weather")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let context = ServiceContext::from_config(config, paths).await.unwrap();
    let service = IngestService::start(context).await.unwrap();

    let report = service
        .check_similarity(SongInput::Lyrics("day get better top good famili good weather".to_string()))
        .await
        .unwrap();
    assert!(report.is_match);

    let refresh = service.refresh_index().await.unwrap();
    assert_eq!(refresh.snapshot.document_count, 1);
    assert!(!refresh.refitted);

    service.shutdown().await;
}
