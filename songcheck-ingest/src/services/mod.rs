//! Pipeline services
//!
//! Leaf components the orchestrator and the similarity index are built from.

pub mod audio_validator;
pub mod concurrency_gate;
pub mod language_detector;
pub mod text_normalizer;
pub mod tool_runner;
pub mod transcriber;
pub mod worker_pool;

pub use audio_validator::{ArtifactRejection, AudioValidator};
pub use concurrency_gate::{ConcurrencyGate, GateClosed, GatePermit};
pub use language_detector::{LanguageDetector, LanguageVerdict, ScriptLanguageDetector};
pub use text_normalizer::{LyricNormalizer, Normalizer};
pub use tool_runner::{ToolCommand, ToolError, ToolOutput, ToolRunner};
pub use transcriber::{CommandTranscriber, Transcriber};
pub use worker_pool::{PoolError, WorkerPool};
