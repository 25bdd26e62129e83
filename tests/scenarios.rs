//! End-to-end scenarios (spec §8 "Concrete end-to-end scenarios"), built
//! against the public `conclave` surface with hand-written mock agent
//! capabilities and tool handlers — no mocking framework, matching the
//! teacher's own integration-test style.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use conclave::agent::{AgentCapability, AgentResponse};
use conclave::config::{AnalyzeOptions, CacheTtls};
use conclave::error::{ClassifiedFailure, FailureKind};
use conclave::graph::AgentSet;
use conclave::resilience::{BoundedCache, BreakerGroup};
use conclave::state::Message;
use conclave::tools::invoker::InvokerConfig;
use conclave::tools::registry::{Classification, ToolDescriptor, ToolHandler};
use conclave::tools::{ToolInvoker, ToolRegistry};
use conclave::{analyze, RunInputs};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
}

struct StaticCapability {
    text: &'static str,
}

#[async_trait]
impl AgentCapability for StaticCapability {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tool_schemas: &[serde_json::Value],
    ) -> Result<AgentResponse, ClassifiedFailure> {
        Ok(AgentResponse::Final { text: self.text.to_string() })
    }
}

fn cap(text: &'static str) -> Arc<dyn AgentCapability> {
    Arc::new(StaticCapability { text })
}

/// Requests `get_quote` once, then synthesizes a final report as soon as a
/// tool-result message is visible in its channel.
struct QuoteRequestingCapability;

#[async_trait]
impl AgentCapability for QuoteRequestingCapability {
    async fn invoke(
        &self,
        messages: &[Message],
        _tool_schemas: &[serde_json::Value],
    ) -> Result<AgentResponse, ClassifiedFailure> {
        let already_has_result = messages.iter().any(|m| m.role == conclave::state::Role::Tool);
        if already_has_result {
            Ok(AgentResponse::Final { text: "Market report: quote data reviewed".to_string() })
        } else {
            Ok(AgentResponse::ToolRequests {
                requests: vec![conclave::state::ToolRequest {
                    name: "get_quote".to_string(),
                    arguments: serde_json::json!({"ticker": "X"}),
                    correlation_id: "c-quote-1".to_string(),
                }],
            })
        }
    }
}

/// Never stops requesting `get_quote` with a fresh argument each time,
/// modeling Scenario C's "keeps requesting indefinitely" mock.
struct QuotaHogCapability {
    counter: AtomicU32,
}

#[async_trait]
impl AgentCapability for QuotaHogCapability {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tool_schemas: &[serde_json::Value],
    ) -> Result<AgentResponse, ClassifiedFailure> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(AgentResponse::ToolRequests {
            requests: vec![conclave::state::ToolRequest {
                name: "get_quote".to_string(),
                arguments: serde_json::json!({"call": n}),
                correlation_id: format!("c-{n}"),
            }],
        })
    }
}

struct EchoQuoteHandler;

#[async_trait]
impl ToolHandler for EchoQuoteHandler {
    async fn handle(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ClassifiedFailure> {
        Ok(serde_json::json!({"echo": arguments}))
    }
}

struct AlwaysFailsHandler;

#[async_trait]
impl ToolHandler for AlwaysFailsHandler {
    async fn handle(&self, _arguments: &serde_json::Value) -> Result<serde_json::Value, ClassifiedFailure> {
        Err(ClassifiedFailure::new(FailureKind::NetworkError, "market data down"))
    }
}

struct SleepyCapability {
    sleep_for: Duration,
}

#[async_trait]
impl AgentCapability for SleepyCapability {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tool_schemas: &[serde_json::Value],
    ) -> Result<AgentResponse, ClassifiedFailure> {
        tokio::time::sleep(self.sleep_for).await;
        Ok(AgentResponse::Final { text: "too slow to matter".to_string() })
    }
}

fn base_agent_set() -> AgentSet {
    AgentSet {
        market: cap("range-bound"),
        social: cap("sentiment mixed"),
        news: cap("no material news"),
        fundamentals: cap("fundamentals stable"),
        bull: cap("upside case: strong cash flow"),
        bear: cap("downside case: margin compression"),
        debate_judge: cap(r#"{"score": 5.0, "feedback": "needs another look at valuation"}"#),
        research_manager: cap("Plan: accumulate on dips"),
        trader: cap("Trade plan: BUY 100 shares"),
        risk_aggressive: cap("go bigger"),
        risk_conservative: cap("trim size"),
        risk_neutral: cap("as proposed"),
        risk_judge: cap("Recommendation: BUY — thesis intact"),
    }
}

fn empty_registry_invoker(registry: Arc<ToolRegistry>, breakers: Arc<BreakerGroup>) -> Arc<ToolInvoker> {
    Arc::new(ToolInvoker::new(
        registry,
        breakers,
        Arc::new(BoundedCache::new(64)),
        InvokerConfig {
            tool_timeout: Duration::from_secs(2),
            tool_retry_attempts: 2,
            circuit_breaker_enabled: true,
            cache_enabled: true,
        },
        CacheTtls::default(),
    ))
}

fn quote_registry(handler: Box<dyn ToolHandler>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ToolDescriptor {
        name: "get_quote".to_string(),
        schema: serde_json::json!({"type": "object"}),
        handler,
        classification: Classification::ReadOnly,
        default_ttl: Duration::from_secs(300),
        breaker_group: "market-data".to_string(),
    });
    registry
}

/// Scenario A — happy path, all tools succeed.
#[tokio::test]
async fn scenario_a_happy_path_classifies_buy_and_populates_every_report() {
    let registry = Arc::new(quote_registry(Box::new(EchoQuoteHandler)));
    let breakers = Arc::new(BreakerGroup::default());
    let invoker = empty_registry_invoker(registry.clone(), breakers);

    let mut agents = base_agent_set();
    agents.market = Arc::new(QuoteRequestingCapability);

    let result = analyze(
        "AAPL",
        date(),
        RunInputs {
            agents,
            registry,
            invoker,
            options: AnalyzeOptions::default(),
        },
    )
    .await
    .expect("valid ticker");

    assert_eq!(result.decision, "BUY");
    assert_eq!(result.reports.len(), 4);
    assert!(result.reports.values().all(|r| !r.is_empty()));
    assert!(!result.trace.has_error());
    assert!(!result.trace.is_empty());
}

/// Scenario B — one data source fully down: the market-data circuit is
/// forced open before the run starts, so the analyst never gets quote data
/// and the pipeline still reaches a classified decision.
#[tokio::test]
async fn scenario_b_circuit_open_for_one_service_still_converges() {
    let registry = Arc::new(quote_registry(Box::new(AlwaysFailsHandler)));
    let breakers = Arc::new(BreakerGroup::default());
    let market_breaker = breakers.get_or_create("market-data");
    for _ in 0..6 {
        market_breaker.record_failure();
    }
    assert_eq!(market_breaker.state(), conclave::resilience::CircuitState::Open);

    let invoker = empty_registry_invoker(registry.clone(), breakers);

    let mut agents = base_agent_set();
    agents.market = Arc::new(QuoteRequestingCapability);

    let result = analyze(
        "NVDA",
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        RunInputs {
            agents,
            registry,
            invoker,
            options: AnalyzeOptions::default(),
        },
    )
    .await
    .expect("valid ticker");

    assert!(["BUY", "SELL", "HOLD"].contains(&result.decision.as_str()));
    assert_eq!(result.reports.len(), 4);
    assert!(result.reports.values().all(|r| !r.is_empty()));
}

/// Scenario C — quota exhaustion: an analyst that never stops asking for
/// tool calls is cut off at its configured quota and still produces a
/// report.
#[tokio::test]
async fn scenario_c_quota_exhaustion_still_produces_a_report() {
    let registry = Arc::new(quote_registry(Box::new(EchoQuoteHandler)));
    let breakers = Arc::new(BreakerGroup::default());
    let invoker = empty_registry_invoker(registry.clone(), breakers);

    let mut agents = base_agent_set();
    agents.market = Arc::new(QuotaHogCapability {
        counter: AtomicU32::new(0),
    });

    let mut overrides = std::collections::HashMap::new();
    overrides.insert("market".to_string(), 3u32);

    let result = analyze(
        "TSLA",
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        RunInputs {
            agents,
            registry,
            invoker,
            options: AnalyzeOptions {
                per_analyst_quota_overrides: Some(overrides),
                ..Default::default()
            },
        },
    )
    .await
    .expect("valid ticker");

    assert!(!result.reports[&conclave::state::AnalystKind::Market].is_empty());
    assert!(["BUY", "SELL", "HOLD"].contains(&result.decision.as_str()));
}

/// Scenario D — deadline breach: every agent sleeps far longer than the
/// configured execution deadline, so the run must still return a `HOLD`
/// within the deadline instead of hanging.
#[tokio::test(start_paused = true)]
async fn scenario_d_deadline_breach_falls_back_to_hold() {
    let registry = Arc::new(ToolRegistry::new());
    let breakers = Arc::new(BreakerGroup::default());
    let invoker = empty_registry_invoker(registry.clone(), breakers);

    let slow = Arc::new(SleepyCapability {
        sleep_for: Duration::from_secs(10),
    }) as Arc<dyn AgentCapability>;
    let mut agents = base_agent_set();
    agents.market = slow.clone();
    agents.social = slow.clone();
    agents.news = slow.clone();
    agents.fundamentals = slow;

    let result = analyze(
        "GME",
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        RunInputs {
            agents,
            registry,
            invoker,
            options: AnalyzeOptions {
                deadline_seconds: Some(2),
                ..Default::default()
            },
        },
    )
    .await
    .expect("valid ticker");

    assert_eq!(result.decision, "HOLD");
    assert!(result.narrative.to_lowercase().contains("deadline") || result.narrative.contains("HOLD"));
}

/// Scenario E — debate early consensus: a judge score of 9.0 after round 1
/// ends the debate without a second round.
#[tokio::test]
async fn scenario_e_early_consensus_stops_after_one_round() {
    let registry = Arc::new(ToolRegistry::new());
    let breakers = Arc::new(BreakerGroup::default());
    let invoker = empty_registry_invoker(registry.clone(), breakers);

    let mut agents = base_agent_set();
    agents.debate_judge = cap(r#"{"score": 9.0, "feedback": "clear consensus reached"}"#);

    let result = analyze(
        "MSFT",
        NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
        RunInputs {
            agents,
            registry,
            invoker,
            options: AnalyzeOptions {
                max_debate_rounds: Some(5),
                ..Default::default()
            },
        },
    )
    .await
    .expect("valid ticker");

    let bull_turns = result
        .trace
        .events
        .iter()
        .filter(|e| e.node == "debate.bull")
        .count();
    let bear_turns = result
        .trace
        .events
        .iter()
        .filter(|e| e.node == "debate.bear")
        .count();
    assert_eq!(bull_turns, 1);
    assert_eq!(bear_turns, 1);
}

/// Scenario F — duplicate tool request: the same (tool, args) pair asked
/// for twice by the same analyst is refused the second time without
/// growing the ledger.
#[tokio::test]
async fn scenario_f_duplicate_tool_request_is_refused_without_double_counting() {
    use conclave::state::{AnalystLedger, ToolRequest};

    let registry = quote_registry(Box::new(EchoQuoteHandler));
    let breakers = BreakerGroup::default();
    let invoker = ToolInvoker::new(
        Arc::new(registry),
        Arc::new(breakers),
        Arc::new(BoundedCache::new(64)),
        InvokerConfig {
            tool_timeout: Duration::from_secs(2),
            tool_retry_attempts: 1,
            circuit_breaker_enabled: true,
            cache_enabled: true,
        },
        CacheTtls::default(),
    );

    let mut ledger = AnalystLedger::default();
    let request = ToolRequest {
        name: "get_quote".to_string(),
        arguments: serde_json::json!({"ticker": "DUP"}),
        correlation_id: "c1".to_string(),
    };

    let first = invoker.invoke(&request, &ledger, 20).await;
    assert_eq!(first.envelope.status, conclave::tools::EnvelopeStatus::Ok);
    let (tool, hash) = first.ledger_record.clone().expect("first call records ledger entry");
    ledger.record(&tool, &hash);

    let second = invoker.invoke(&request, &ledger, 20).await;
    assert_eq!(second.envelope.status, conclave::tools::EnvelopeStatus::Refused);
    assert_eq!(
        second.envelope.failure.unwrap().kind,
        FailureKind::DuplicateRequest
    );
    assert!(second.ledger_record.is_none());
    assert_eq!(ledger.total, 1);
}
