// Worker-facing types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One transcribed spoken unit. Timestamps are relative to the owning
/// segment until reconciliation shifts them into asset-global time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Utterance {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Utterance {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            confidence: None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end - self.start
    }
}

/// Terminal outcome recorded for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Succeeded,
    Failed,
}

/// Per-segment result record, keyed by segment index. Written exactly once
/// when the segment reaches a terminal state (last write wins on retry) and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResult {
    pub index: u32,
    pub status: ResultStatus,
    pub utterances: Vec<Utterance>,
}

impl SegmentResult {
    pub fn succeeded(index: u32, utterances: Vec<Utterance>) -> Self {
        Self {
            index,
            status: ResultStatus::Succeeded,
            utterances,
        }
    }

    pub fn failed(index: u32) -> Self {
        Self {
            index,
            status: ResultStatus::Failed,
            utterances: Vec::new(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == ResultStatus::Succeeded
    }
}

/// Lifecycle of one segment inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentStatus {
    Pending,
    Submitted,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl SegmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SegmentStatus::Succeeded | SegmentStatus::Failed)
    }
}

/// Worker failure with retry classification.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("Transient worker failure: {0}")]
    Transient(String),

    #[error("Permanent worker failure: {0}")]
    Permanent(String),
}

impl WorkerError {
    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Transient(_))
    }
}
