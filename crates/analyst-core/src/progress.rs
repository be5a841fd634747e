use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One phase in a job's lifecycle, used both as the Orchestrator's internal
/// state label and as the wire-facing `phase` field of a [`ProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Queued,
    LoadingContext,
    Prompting,
    GeneratingCode,
    ExecutingCode,
    Summarizing,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

/// A single ordered entry in a job's progress stream.
///
/// `seq` is assigned server-side by the broker and is strictly increasing
/// per job; a subscriber connecting with `from_seq = k` must see every event
/// with `seq >= k`, in order, exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub phase: Phase,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_output: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, detail: impl Into<String>) -> Self {
        Self {
            seq: 0,
            at: Utc::now(),
            phase,
            detail: detail.into(),
            partial_output: None,
        }
    }

    pub fn with_partial_output(mut self, output: impl Into<String>) -> Self {
        self.partial_output = Some(output.into());
        self
    }
}
