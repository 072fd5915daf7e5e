//! songcheck-ingest: lyric fingerprinting and duplicate detection
//!
//! Turns an uploaded song into clean lyric text (vocal separation, tempo
//! change, silence trim, speech-to-text) and compares that text against a
//! reference corpus, or classifies its genre.
//!
//! [`IngestService`] is the entry point; the binary wraps it in a CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod services;
pub mod similarity;
pub mod utils;
pub mod workflow;

pub use crate::config::{IngestConfig, ResolvedPaths};
pub use crate::error::{ErrorCategory, FailureReport, IngestError, IngestResult};
pub use crate::service::{IngestService, ServiceContext, SongInput};
