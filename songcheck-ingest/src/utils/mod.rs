//! Utility modules for songcheck-ingest

pub mod audio_decoder;

pub use audio_decoder::{probe_audio, AudioProbe};
