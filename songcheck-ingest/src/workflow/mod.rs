//! Request workflow: upload intake and pipeline orchestration

pub mod intake;
pub mod orchestrator;

pub use intake::{UploadIntake, UploadedFile};
pub use orchestrator::{PipelineOrchestrator, PipelineOutcome};
