//! RemediationWorkflow - Visual Fix State Machine
//!
//! IDLE -> SUBMITTING -> RENDERED, or back to IDLE when the edit comes back
//! empty. The network call happens outside this type: `begin_submit` hands
//! out a ticket, the caller runs the edit, then feeds the answer to
//! `complete`. Tickets from before a `flush` are ignored.

use crate::models::{CapturedFrame, RemediationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemediationPhase {
    Idle,
    Submitting,
    Rendered,
}

/// Image the remediation view should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayedImage {
    /// Captured frame (nothing rendered yet, or compare held)
    Original,
    Remediated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationRejection {
    NoFrame,
    EmptyInstruction,
    AlreadySubmitting,
}

impl fmt::Display for RemediationRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationRejection::NoFrame => f.write_str("no captured frame"),
            RemediationRejection::EmptyInstruction => f.write_str("empty instruction"),
            RemediationRejection::AlreadySubmitting => f.write_str("already submitting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RemediationOutcome {
    Rendered,
    /// Edit returned nothing; phase is back to IDLE
    Failed,
    /// Completion arrived after a flush and was dropped
    Superseded,
    Rejected(RemediationRejection),
}

/// One admitted submission
#[derive(Debug, Clone)]
pub struct RemediationTicket {
    generation: u64,
    pub frame: Arc<CapturedFrame>,
    pub instruction: String,
}

impl RemediationTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
pub struct RemediationWorkflow {
    phase: RemediationPhase,
    instruction: String,
    result: Option<Arc<RemediationResult>>,
    compare_held: bool,
    generation: u64,
}

impl RemediationWorkflow {
    pub fn new() -> Self {
        Self {
            phase: RemediationPhase::Idle,
            instruction: String::new(),
            result: None,
            compare_held: false,
            generation: 0,
        }
    }

    pub fn phase(&self) -> RemediationPhase {
        self.phase
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn result(&self) -> Option<Arc<RemediationResult>> {
        self.result.clone()
    }

    pub fn is_compare_held(&self) -> bool {
        self.compare_held
    }

    pub fn set_instruction(&mut self, instruction: impl Into<String>) {
        self.instruction = instruction.into();
    }

    /// Whether a submission would be admitted for `has_frame`
    pub fn can_submit(&self, has_frame: bool) -> bool {
        self.check(has_frame).is_ok()
    }

    fn check(&self, has_frame: bool) -> Result<(), RemediationRejection> {
        if self.phase == RemediationPhase::Submitting {
            return Err(RemediationRejection::AlreadySubmitting);
        }
        if !has_frame {
            return Err(RemediationRejection::NoFrame);
        }
        if self.instruction.trim().is_empty() {
            return Err(RemediationRejection::EmptyInstruction);
        }
        Ok(())
    }

    /// Admit a submission against the current frame
    ///
    /// Clears any previous render right away.
    pub fn begin_submit(
        &mut self,
        frame: Option<Arc<CapturedFrame>>,
    ) -> Result<RemediationTicket, RemediationRejection> {
        self.check(frame.is_some())?;
        let frame = frame.ok_or(RemediationRejection::NoFrame)?;

        self.result = None;
        self.phase = RemediationPhase::Submitting;

        Ok(RemediationTicket {
            generation: self.generation,
            frame,
            instruction: self.instruction.clone(),
        })
    }

    /// Apply the edit answer for `ticket`
    pub fn complete(
        &mut self,
        ticket: &RemediationTicket,
        edited: Option<RemediationResult>,
    ) -> RemediationOutcome {
        if ticket.generation != self.generation {
            return RemediationOutcome::Superseded;
        }

        match edited {
            Some(result) => {
                self.result = Some(Arc::new(result));
                self.phase = RemediationPhase::Rendered;
                self.compare_held = false;
                RemediationOutcome::Rendered
            }
            None => {
                self.phase = RemediationPhase::Idle;
                RemediationOutcome::Failed
            }
        }
    }

    pub fn hold_compare(&mut self) {
        self.compare_held = true;
    }

    pub fn release_compare(&mut self) {
        self.compare_held = false;
    }

    pub fn displayed(&self) -> DisplayedImage {
        if self.result.is_some() && !self.compare_held {
            DisplayedImage::Remediated
        } else {
            DisplayedImage::Original
        }
    }

    /// Clear result and instruction, back to IDLE
    pub fn flush(&mut self) {
        self.generation += 1;
        self.phase = RemediationPhase::Idle;
        self.instruction.clear();
        self.result = None;
        self.compare_held = false;
    }
}

impl Default for RemediationWorkflow {
    fn default() -> Self {
        Self::new()
    }
}
