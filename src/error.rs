//! Error types.
//!
//! `conclave` splits errors into two layers, mirroring the split the teacher
//! draws between [`ToucanError`](https://docs.rs/toucan-core) (control-plane,
//! raised from fallible construction) and the tagged failures an `Engine`
//! records in its audit trail (data-plane, never raised).
//!
//! [`ConclaveError`] is the control-plane type: it is the only error
//! `conclave`'s public API can return, and only from input validation or
//! construction. [`FailureKind`] is the data-plane type: the closed taxonomy
//! of §7, carried inside tool envelopes and trace events, that the engine
//! always *returns as data* rather than raising.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error returned by fallible `conclave` construction and
/// validation entry points.
///
/// `Engine`-internal failures never reach this type: per the propagation
/// policy in spec §7, the Run Coordinator always returns a `HOLD` decision
/// with the failure surfaced in the narrative and trace instead of raising.
#[derive(Debug, Clone, Error)]
pub enum ConclaveError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("task join failure: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for ConclaveError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Join(format!("{value:?}"))
    }
}

/// Configuration-loading failure.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("environment variable {name} could not be parsed as {expected}: {value}")]
    InvalidEnvVar {
        name: String,
        expected: &'static str,
        value: String,
    },
}

/// Closed taxonomy of classified failures (spec §4.1, §7).
///
/// Every resilience primitive, tool invocation, and trace event reports
/// failures using this set. It is deliberately closed and serializable so it
/// can travel inside a [`crate::tools::Envelope`] or a
/// [`crate::state::trace::TraceEvent`] without leaking arbitrary error types
/// across the agent/tool boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// A scoped [`crate::resilience::timeout`] expired.
    Timeout,
    /// The external service indicated throttling.
    RateLimit,
    /// The external service returned a structured error.
    ApiError,
    /// A transport-level failure occurred.
    NetworkError,
    /// Malformed input, invalid tool arguments, or a rejected state patch.
    ValidationError,
    /// The call succeeded but returned empty/insufficient data.
    NoResults,
    /// A circuit breaker rejected the call.
    CircuitOpen,
    /// The calling agent has used its per-run tool budget.
    QuotaExhausted,
    /// The exact (tool, arguments) pair was already served to this agent.
    DuplicateRequest,
}

impl FailureKind {
    /// Whether [`crate::resilience::retry`] should retry a failure of this
    /// kind. Per spec §4.1, only the transient set is retryable; everything
    /// else propagates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::RateLimit | FailureKind::NetworkError
        )
    }
}

/// A tagged failure value, as produced by every resilience primitive.
///
/// Grounded on the `{kind, message, retryable, details}` shape mandated by
/// spec §4.1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedFailure {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
    pub details: Option<serde_json::Value>,
}

impl ClassifiedFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let retryable = kind.is_retryable();
        Self {
            kind,
            message: message.into(),
            retryable,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ClassifiedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClassifiedFailure {}
