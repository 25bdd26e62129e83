//! Run Trace (spec §3 "Run Trace", §6 "Trace schema"). Append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStatus::Success => "success",
            TraceStatus::Error => "error",
            TraceStatus::Timeout => "timeout",
            TraceStatus::Cancelled => "cancelled",
        }
    }
}

/// Token usage, when the agent capability reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

/// One entry of the ordered, append-only run trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub node: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: TraceStatus,
    pub error_kind: Option<FailureKind>,
    pub tokens: Option<TokenUsage>,
}

/// The append-only trace collected over the lifetime of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub events: Vec<TraceEvent>,
}

impl RunTrace {
    pub fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_error(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.status, TraceStatus::Error))
    }

    pub fn has_status(&self, status: TraceStatus) -> bool {
        self.events.iter().any(|e| e.status == status)
    }
}
