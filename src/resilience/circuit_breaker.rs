//! Circuit Breaker (spec §4.1). Three states, one instance per logical
//! external service, named registry ("breaker group").
//!
//! Confirmed against `examples/original_source/.../circuit_breaker.py`: the
//! closed/open/half-open transitions and threshold semantics here match the
//! original one-for-one (SPEC_FULL.md §F.1).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use crate::error::{ClassifiedFailure, FailureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
}

/// One circuit breaker guarding one logical external service.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.effective_state()
    }

    /// Resolves `Open -> HalfOpen` lazily (no background task needed in the
    /// single-threaded event loop): any read of state first checks whether
    /// the recovery timeout has elapsed.
    fn effective_state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            if let Some(last_failure) = inner.last_failure_at {
                if last_failure.elapsed() >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    info!(breaker = %self.name, "circuit breaker half-opening after recovery timeout");
                }
            }
        }
        inner.state
    }

    /// Duration remaining until the breaker probes again, for the
    /// `circuit_open` failure's `details`.
    fn time_until_probe(&self, inner: &BreakerInner) -> Duration {
        match inner.last_failure_at {
            Some(last) => self
                .config
                .recovery_timeout
                .saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    info!(breaker = %self.name, "circuit breaker closing after successful probe");
                }
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                info!(breaker = %self.name, "circuit breaker re-opening after probe failure");
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    info!(breaker = %self.name, failures = inner.consecutive_failures, "circuit breaker opening");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Runs `op` if the breaker permits it, recording the outcome. Rejects
    /// immediately with a `circuit_open` failure while open.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ClassifiedFailure>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClassifiedFailure>>,
    {
        if self.effective_state() == CircuitState::Open {
            let remaining = {
                let inner = self.inner.lock();
                self.time_until_probe(&inner)
            };
            return Err(ClassifiedFailure::new(
                FailureKind::CircuitOpen,
                format!("circuit '{}' is open", self.name),
            )
            .with_details(serde_json::json!({
                "time_until_probe_secs": remaining.as_secs_f64(),
            })));
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(failure) => {
                self.record_failure();
                Err(failure)
            }
        }
    }
}

/// A named registry of circuit breakers, one per breaker group (spec §4.1
/// "One breaker instance per logical external service; named registry").
pub struct BreakerGroup {
    breakers: Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
    default_config: BreakerConfig,
}

impl BreakerGroup {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            default_config,
        }
    }

    pub fn get_or_create(&self, name: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new(name, self.default_config)))
            .clone()
    }
}

impl Default for BreakerGroup {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
