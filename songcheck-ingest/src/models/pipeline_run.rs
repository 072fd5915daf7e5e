//! Pipeline state machine
//!
//! One run per request, strictly forward:
//! UPLOADED → SEPARATING → SLOWING → TRIMMING_SILENCE → TRANSCRIBING → DONE
//!
//! Any state may jump to FAILED. Terminal states accept no further transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A stage of the media conversion pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Whole mix → isolated vocal track
    Separation,
    /// Vocals → time-stretched audio
    Tempo,
    /// Stretched audio → silence removed
    SilenceTrim,
    /// Trimmed audio → text
    Transcription,
}

impl PipelineStage {
    /// State the run is in while this stage executes
    pub fn running_state(&self) -> PipelineState {
        match self {
            PipelineStage::Separation => PipelineState::Separating,
            PipelineStage::Tempo => PipelineState::Slowing,
            PipelineStage::SilenceTrim => PipelineState::TrimmingSilence,
            PipelineStage::Transcription => PipelineState::Transcribing,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Separation => "vocal separation",
            PipelineStage::Tempo => "tempo change",
            PipelineStage::SilenceTrim => "silence trim",
            PipelineStage::Transcription => "transcription",
        };
        f.write_str(name)
    }
}

/// Pipeline run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Uploaded,
    Separating,
    Slowing,
    TrimmingSilence,
    Transcribing,
    /// All stages completed
    Done,
    /// A stage failed; the session gets torn down
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Recorded state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub request_id: Uuid,
    pub old_state: PipelineState,
    pub new_state: PipelineState,
    pub transitioned_at: DateTime<Utc>,
}

/// Rejected state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal pipeline transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// In-memory record of one pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub request_id: Uuid,
    pub state: PipelineState,
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: PipelineState::Uploaded,
            transitions: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move forward to `new_state`
    ///
    /// Only moves to a later state are legal, FAILED is reachable from any
    /// non-terminal state, and nothing leaves a terminal state.
    pub fn transition_to(
        &mut self,
        new_state: PipelineState,
    ) -> Result<StateTransition, IllegalTransition> {
        let legal = !self.state.is_terminal()
            && (new_state == PipelineState::Failed || new_state > self.state);
        if !legal {
            return Err(IllegalTransition {
                from: self.state,
                to: new_state,
            });
        }

        let transition = StateTransition {
            request_id: self.request_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }
        self.transitions.push(transition.clone());

        Ok(transition)
    }

    /// Mark the run failed; no-op if already terminal
    pub fn fail(&mut self) {
        let _ = self.transition_to(PipelineState::Failed);
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
