//! Resilience Primitives (spec §4.1): retry, circuit breaker, timeout,
//! bounded cache, fallback composer. Every external call in `conclave` goes
//! through this layer so that failures are classified consistently and each
//! primitive is testable in isolation — the re-architecture called for in
//! SPEC_FULL.md §F/spec §9 ("ad-hoc retry/backoff... consolidated into the
//! Resilience Primitives").

pub mod cache;
pub mod circuit_breaker;
pub mod fallback;
pub mod retry;
pub mod timeout;

pub use cache::{BoundedCache, CacheEntry};
pub use circuit_breaker::{BreakerGroup, CircuitBreaker, CircuitState};
pub use fallback::execute_with_fallback;
pub use retry::{execute_with_retry, RetryPolicy};
pub use timeout::with_timeout;
