//! Error types for songcheck-ingest
//!
//! Every failure a request can end with maps onto one [`ErrorCategory`].
//! Callers branch on the category, and users see a [`FailureReport`].

use crate::models::PipelineStage;
use crate::services::tool_runner::ToolError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Machine-checkable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Bad file type, oversized upload, unusable input audio. Client error, no retry.
    InputValidation,
    /// External tool failed or produced an unusable artifact. Stage-fatal.
    ToolExecution,
    /// A stage exceeded its deadline. Stage-fatal, logged apart from tool failures.
    Timeout,
    /// No usable transcript, or lyrics that cannot be compared.
    EmptyResult,
    /// Corpus store, filesystem, or lifecycle failure
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InputValidation => "INPUT_VALIDATION",
            ErrorCategory::ToolExecution => "TOOL_EXECUTION",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::EmptyResult => "EMPTY_RESULT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }
}

/// Ingest error type
#[derive(Debug, Error)]
pub enum IngestError {
    /// Upload or input audio rejected before any stage ran
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// External tool failed during a stage
    #[error("{stage} failed: {source}")]
    Tool {
        stage: PipelineStage,
        #[source]
        source: ToolError,
    },

    /// Tool reported success but its artifact did not validate
    #[error("{stage} produced an unusable artifact: {}", path.display())]
    InvalidArtifact { stage: PipelineStage, path: PathBuf },

    /// Outer deadline of a worker pool submission expired
    #[error("{stage} exceeded its {}s deadline", deadline.as_secs())]
    Timeout {
        stage: PipelineStage,
        deadline: Duration,
    },

    /// Nothing usable came out (empty transcript, unsupported lyrics)
    #[error("No usable result: {0}")]
    EmptyResult(String),

    /// A component needed for the request is not available
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// songcheck-common error
    #[error("Common error: {0}")]
    Common(#[from] songcheck_common::Error),
}

impl IngestError {
    /// Category the caller branches on
    pub fn category(&self) -> ErrorCategory {
        match self {
            IngestError::InputValidation(_) => ErrorCategory::InputValidation,
            IngestError::Tool {
                source: ToolError::TimedOut { .. },
                ..
            } => ErrorCategory::Timeout,
            IngestError::Tool { .. } | IngestError::InvalidArtifact { .. } => {
                ErrorCategory::ToolExecution
            }
            IngestError::Timeout { .. } => ErrorCategory::Timeout,
            IngestError::EmptyResult(_) => ErrorCategory::EmptyResult,
            IngestError::Unavailable(_)
            | IngestError::Internal(_)
            | IngestError::Io(_)
            | IngestError::Common(_) => ErrorCategory::Internal,
        }
    }

    /// Stable error code for the failure report
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InputValidation(_) => "BAD_REQUEST",
            IngestError::Tool { .. } => "TOOL_FAILED",
            IngestError::InvalidArtifact { .. } => "INVALID_ARTIFACT",
            IngestError::Timeout { .. } => "DEADLINE_EXCEEDED",
            IngestError::EmptyResult(_) => "EMPTY_RESULT",
            IngestError::Unavailable(_) => "UNAVAILABLE",
            IngestError::Internal(_) => "INTERNAL_ERROR",
            IngestError::Io(_) => "IO_ERROR",
            IngestError::Common(_) => "COMMON_ERROR",
        }
    }

    /// Structured failure shown to the user
    pub fn report(&self) -> FailureReport {
        FailureReport {
            error: FailureBody {
                code: self.code(),
                category: self.category(),
                message: self.to_string(),
            },
        }
    }
}

/// User-visible failure: `{"error": {"code", "category", "message"}}`
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub error: FailureBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureBody {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

/// Result type for ingest operations
pub type IngestResult<T> = Result<T, IngestError>;
