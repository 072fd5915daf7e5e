//! Data models for songcheck-ingest

pub mod artifact;
pub mod pipeline_run;
pub mod request_session;

pub use artifact::AudioArtifact;
pub use pipeline_run::{IllegalTransition, PipelineRun, PipelineStage, PipelineState, StateTransition};
pub use request_session::RequestSession;
