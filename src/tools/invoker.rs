//! Tool Invoker (spec §4.2). Always produces exactly one envelope per
//! request — the analyst message-channel pairing invariant depends on this,
//! so nothing in this module is allowed to raise.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClassifiedFailure, FailureKind};
use crate::resilience::{execute_with_retry, with_timeout, BreakerGroup, RetryPolicy};
use crate::state::{AnalystLedger, ToolRequest};

use super::ledger::canonicalize_and_hash;
use super::registry::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeStatus {
    Ok,
    Refused,
    Error,
}

/// The normalized result of one tool invocation (spec GLOSSARY "Envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub correlation_id: String,
    pub status: EnvelopeStatus,
    pub content: serde_json::Value,
    pub cached: bool,
    pub failure: Option<ClassifiedFailure>,
}

impl Envelope {
    fn error(correlation_id: &str, message: impl Into<String>, kind: FailureKind) -> Self {
        let message = message.into();
        Self {
            correlation_id: correlation_id.to_string(),
            status: EnvelopeStatus::Error,
            content: serde_json::Value::Null,
            cached: false,
            failure: Some(ClassifiedFailure::new(kind, message)),
        }
    }

    fn refused(correlation_id: &str, reason: impl Into<String>, kind: FailureKind) -> Self {
        let reason = reason.into();
        Self {
            correlation_id: correlation_id.to_string(),
            status: EnvelopeStatus::Refused,
            content: serde_json::json!({ "reason": reason }),
            cached: false,
            failure: Some(ClassifiedFailure::new(kind, reason)),
        }
    }

    fn ok(correlation_id: &str, content: serde_json::Value, cached: bool) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            status: EnvelopeStatus::Ok,
            content,
            cached,
            failure: None,
        }
    }
}

/// Outcome of one `invoke` call: the envelope to append to the channel, and
/// — only on a fresh successful handler call — the ledger key to record via
/// [`crate::state::reducers::StatePatch::ledger_records`].
pub struct InvokeOutcome {
    pub envelope: Envelope,
    pub ledger_record: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct InvokerConfig {
    pub tool_timeout: Duration,
    pub tool_retry_attempts: u32,
    pub circuit_breaker_enabled: bool,
    pub cache_enabled: bool,
}

pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    breakers: Arc<BreakerGroup>,
    cache: Arc<crate::resilience::BoundedCache<serde_json::Value>>,
    config: InvokerConfig,
    cache_ttls: crate::config::CacheTtls,
}

impl ToolInvoker {
    pub fn new(
        registry: Arc<ToolRegistry>,
        breakers: Arc<BreakerGroup>,
        cache: Arc<crate::resilience::BoundedCache<serde_json::Value>>,
        config: InvokerConfig,
        cache_ttls: crate::config::CacheTtls,
    ) -> Self {
        Self {
            registry,
            breakers,
            cache,
            config,
            cache_ttls,
        }
    }

    fn ttl_for(&self, tool_name: &str) -> Duration {
        match tool_name {
            name if name.contains("quote") => Duration::from_secs(self.cache_ttls.quote_secs),
            name if name.contains("indicator") => {
                Duration::from_secs(self.cache_ttls.indicators_secs)
            }
            name if name.contains("fundamental") => {
                Duration::from_secs(self.cache_ttls.fundamentals_secs)
            }
            name if name.contains("news") => Duration::from_secs(self.cache_ttls.news_secs),
            _ => Duration::from_secs(self.cache_ttls.quote_secs),
        }
    }

    /// Executes the algorithmic contract of spec §4.2 steps 1–7.
    pub async fn invoke(&self, request: &ToolRequest, ledger: &AnalystLedger, quota: u32) -> InvokeOutcome {
        use tracing::Instrument;
        let span = tracing::info_span!(
            target: "conclave::tools",
            "conclave.tool_invocation",
            tool = %request.name,
            correlation_id = %request.correlation_id,
        );
        self.invoke_inner(request, ledger, quota).instrument(span).await
    }

    async fn invoke_inner(&self, request: &ToolRequest, ledger: &AnalystLedger, quota: u32) -> InvokeOutcome {
        let correlation_id = &request.correlation_id;

        // 1. Validate name exists.
        let Some(descriptor) = self.registry.get(&request.name) else {
            warn!(tool = %request.name, "tool not found");
            return InvokeOutcome {
                envelope: Envelope::error(correlation_id, "tool not found", FailureKind::ValidationError),
                ledger_record: None,
            };
        };

        // 2. Canonicalize + hash arguments.
        let arg_hash = canonicalize_and_hash(&request.name, &request.arguments);

        // 3. Consult ledger.
        if ledger.total >= quota {
            return InvokeOutcome {
                envelope: Envelope::refused(
                    correlation_id,
                    "quota exhausted",
                    FailureKind::QuotaExhausted,
                ),
                ledger_record: None,
            };
        }
        if ledger.contains(&request.name, &arg_hash) {
            return InvokeOutcome {
                envelope: Envelope::refused(
                    correlation_id,
                    "duplicate request; vary parameters",
                    FailureKind::DuplicateRequest,
                ),
                ledger_record: None,
            };
        }

        // 4. Consult cache.
        let cache_key = format!("{}:{}", request.name, arg_hash);
        let ttl = self.ttl_for(&request.name);
        if self.config.cache_enabled {
            if let Some(value) = self.cache.get_fresh(&cache_key, ttl) {
                debug!(tool = %request.name, "cache hit");
                return InvokeOutcome {
                    envelope: Envelope::ok(correlation_id, value, true),
                    ledger_record: Some((request.name.clone(), arg_hash)),
                };
            }
        }

        // 5. Timeout -> Retry -> Circuit Breaker -> handler I/O.
        let breaker = self.breakers.get_or_create(&descriptor.breaker_group);
        let retry_policy = RetryPolicy {
            max_attempts: self.config.tool_retry_attempts.max(1),
            ..RetryPolicy::default()
        };
        let breaker_enabled = self.config.circuit_breaker_enabled;
        let handler = &descriptor.handler;
        let arguments = &request.arguments;

        let outcome = with_timeout(self.config.tool_timeout, &request.name, async {
            execute_with_retry(&retry_policy, &request.name, || async {
                if breaker_enabled {
                    breaker.call(|| handler.handle(arguments)).await
                } else {
                    handler.handle(arguments).await
                }
            })
            .await
        })
        .await;

        match outcome {
            // 6. Handler success: update cache, record ledger entry, return envelope.
            Ok(value) => {
                if self.config.cache_enabled {
                    let _ = self
                        .cache
                        .get_or_compute(&cache_key, ttl, || async { Ok(value.clone()) })
                        .await;
                }
                InvokeOutcome {
                    envelope: Envelope::ok(correlation_id, value, false),
                    ledger_record: Some((request.name.clone(), arg_hash)),
                }
            }
            // 7. Handler failure: no ledger entry; return failure envelope.
            Err(failure) => InvokeOutcome {
                envelope: Envelope {
                    correlation_id: correlation_id.clone(),
                    status: EnvelopeStatus::Error,
                    content: serde_json::Value::Null,
                    cached: false,
                    failure: Some(failure),
                },
                ledger_record: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheTtls;
    use crate::resilience::BoundedCache;
    use crate::tools::registry::{Classification, ToolDescriptor, ToolHandler};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: AtomicU32,
        fail_first_n: u32,
    }

    #[async_trait]
    impl ToolHandler for CountingHandler {
        async fn handle(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ClassifiedFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(ClassifiedFailure::new(FailureKind::NetworkError, "flaky"))
            } else {
                Ok(arguments.clone())
            }
        }
    }

    fn invoker(fail_first_n: u32) -> ToolInvoker {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor {
            name: "get_quote".into(),
            schema: serde_json::json!({"type": "object"}),
            handler: Box::new(CountingHandler {
                calls: AtomicU32::new(0),
                fail_first_n,
            }),
            classification: Classification::ReadOnly,
            default_ttl: Duration::from_secs(300),
            breaker_group: "market-data".into(),
        });
        ToolInvoker::new(
            Arc::new(registry),
            Arc::new(BreakerGroup::default()),
            Arc::new(BoundedCache::new(64)),
            InvokerConfig {
                tool_timeout: Duration::from_secs(5),
                tool_retry_attempts: 3,
                circuit_breaker_enabled: true,
                cache_enabled: true,
            },
            CacheTtls::default(),
        )
    }

    fn request(args: serde_json::Value) -> ToolRequest {
        ToolRequest {
            name: "get_quote".into(),
            arguments: args,
            correlation_id: "c1".into(),
        }
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_envelope() {
        let invoker = invoker(0);
        let bad = ToolRequest {
            name: "unknown".into(),
            arguments: serde_json::json!({}),
            correlation_id: "c1".into(),
        };
        let ledger = AnalystLedger::default();
        let outcome = invoker.invoke(&bad, &ledger, 20).await;
        assert_eq!(outcome.envelope.status, EnvelopeStatus::Error);
        assert!(outcome.ledger_record.is_none());
    }

    #[tokio::test]
    async fn quota_exhausted_is_refused() {
        let invoker = invoker(0);
        let mut ledger = AnalystLedger::default();
        ledger.total = 20;
        let outcome = invoker.invoke(&request(serde_json::json!({"t": 1})), &ledger, 20).await;
        assert_eq!(outcome.envelope.status, EnvelopeStatus::Refused);
        assert_eq!(outcome.envelope.failure.unwrap().kind, FailureKind::QuotaExhausted);
    }

    #[tokio::test]
    async fn duplicate_request_is_refused_without_new_ledger_entry() {
        let invoker = invoker(0);
        let mut ledger = AnalystLedger::default();
        let args = serde_json::json!({"t": 1});
        let hash = canonicalize_and_hash("get_quote", &args);
        ledger.record("get_quote", &hash);
        let outcome = invoker.invoke(&request(args), &ledger, 20).await;
        assert_eq!(outcome.envelope.status, EnvelopeStatus::Refused);
        assert!(outcome.ledger_record.is_none());
    }

    #[tokio::test]
    async fn success_records_ledger_entry() {
        let invoker = invoker(0);
        let ledger = AnalystLedger::default();
        let outcome = invoker
            .invoke(&request(serde_json::json!({"t": 1})), &ledger, 20)
            .await;
        assert_eq!(outcome.envelope.status, EnvelopeStatus::Ok);
        assert!(outcome.ledger_record.is_some());
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_succeeds() {
        let invoker = invoker(1);
        let ledger = AnalystLedger::default();
        let outcome = invoker
            .invoke(&request(serde_json::json!({"t": 1})), &ledger, 20)
            .await;
        assert_eq!(outcome.envelope.status, EnvelopeStatus::Ok);
    }

    #[tokio::test]
    async fn handler_failure_does_not_record_ledger_entry() {
        let invoker = invoker(100);
        let ledger = AnalystLedger::default();
        let outcome = invoker
            .invoke(&request(serde_json::json!({"t": 1})), &ledger, 20)
            .await;
        assert_eq!(outcome.envelope.status, EnvelopeStatus::Error);
        assert!(outcome.ledger_record.is_none());
    }
}
