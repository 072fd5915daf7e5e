//! Shared helpers for songcheck-ingest integration tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod fake_tools;

use std::path::Path;
use std::sync::Arc;

use songcheck_ingest::db::{CorpusDocument, InMemoryCorpus};
use songcheck_ingest::services::{CommandTranscriber, LyricNormalizer, ScriptLanguageDetector};
use songcheck_ingest::{IngestService, ServiceContext};

use fake_tools::FakeTools;

pub fn doc(id: i64, lyrics: &str, genre: Option<&str>) -> CorpusDocument {
    CorpusDocument {
        id,
        lyrics: lyrics.to_string(),
        genre: genre.map(str::to_string),
    }
}

/// Service over an in-memory corpus, using the given fake tools
pub async fn start_service(
    root: &Path,
    tools: &FakeTools,
    corpus: Arc<InMemoryCorpus>,
) -> IngestService {
    let (config, paths) = tools.config(root);
    start_service_with(config, paths, tools, corpus).await
}

pub async fn start_service_with(
    config: songcheck_ingest::IngestConfig,
    paths: songcheck_ingest::ResolvedPaths,
    tools: &FakeTools,
    corpus: Arc<InMemoryCorpus>,
) -> IngestService {
    let context = ServiceContext {
        config,
        paths,
        corpus,
        normalizer: Arc::new(LyricNormalizer::new()),
        detector: Arc::new(ScriptLanguageDetector::new()),
        transcriber: Arc::new(CommandTranscriber::from_argv(&tools.transcriber).expect("transcriber argv")),
    };
    IngestService::start(context).await.expect("start service")
}

/// Entries directly under `dir`; 0 if it does not exist
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Poll until `dir` has no entries or `limit` passes; returns the final count
pub async fn wait_for_empty(dir: &Path, limit: std::time::Duration) -> usize {
    let started = std::time::Instant::now();
    loop {
        let count = entry_count(dir);
        if count == 0 || started.elapsed() >= limit {
            return count;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
