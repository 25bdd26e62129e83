//! Immutable configuration records (spec §6 "Configuration").
//!
//! Grounded on `core/src/system/config.rs`'s style: plain `serde`-derived
//! structs with a hand-written `Default`, no generic `config`-crate layer.
//! `EngineConfig::from_env` reads `CONCLAVE_*` variables over the defaults;
//! `EngineConfig::merge_options` layers a caller's per-call [`AnalyzeOptions`]
//! on top. Neither function performs file or network I/O.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-analyst-kind tool-call quota (spec §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaMap {
    pub market: u32,
    pub social: u32,
    pub news: u32,
    pub fundamentals: u32,
}

impl Default for QuotaMap {
    fn default() -> Self {
        Self {
            market: 20,
            social: 3,
            news: 3,
            fundamentals: 3,
        }
    }
}

impl QuotaMap {
    pub fn get(&self, kind: crate::state::AnalystKind) -> u32 {
        use crate::state::AnalystKind::*;
        match kind {
            Market => self.market,
            Social => self.social,
            News => self.news,
            Fundamentals => self.fundamentals,
        }
    }
}

/// Default TTLs per logical cache data-class (spec §4.1, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTtls {
    pub quote_secs: u64,
    pub indicators_secs: u64,
    pub fundamentals_secs: u64,
    pub news_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            quote_secs: 300,
            indicators_secs: 300,
            fundamentals_secs: 3600,
            news_secs: 300,
        }
    }
}

/// LLM-provider selection (spec §6 "LLM"). The provider and model names are
/// opaque strings here; resolving them to an [`crate::agent::AgentCapability`]
/// is the caller's responsibility, per §1's non-goal on the LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub deep_think_model: String,
    pub quick_think_model: String,
    pub backend_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            deep_think_model: "o3".to_string(),
            quick_think_model: "gpt-4o".to_string(),
            backend_url: None,
        }
    }
}

/// The full immutable configuration record for one engine construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub llm: LlmConfig,

    // Execution
    pub max_debate_rounds: u32,
    pub max_risk_discuss_rounds: u32,
    pub recursion_limit: u32,
    pub execution_timeout: Duration,
    pub force_consensus_threshold: f64,
    pub circuit_breaker_enabled: bool,

    // Tools
    pub quotas: QuotaMap,
    pub tool_timeout: Duration,
    pub tool_retry_attempts: u32,
    pub online_tools: bool,

    // Cache
    pub cache_enabled: bool,
    pub cache_ttls: CacheTtls,

    // Features
    pub enable_parallel_execution: bool,
    pub max_parallel_agents: u32,
    pub enable_tool_cache: bool,
    pub enable_batch_execution: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            recursion_limit: 50,
            execution_timeout: Duration::from_secs(1200),
            force_consensus_threshold: 7.0,
            circuit_breaker_enabled: true,
            quotas: QuotaMap::default(),
            tool_timeout: Duration::from_secs(15),
            tool_retry_attempts: 2,
            online_tools: true,
            cache_enabled: true,
            cache_ttls: CacheTtls::default(),
            enable_parallel_execution: true,
            max_parallel_agents: 4,
            enable_tool_cache: true,
            enable_batch_execution: true,
        }
    }
}

impl EngineConfig {
    /// Reads `CONCLAVE_*` environment variables over [`EngineConfig::default`].
    /// Performs no I/O beyond `std::env::var`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("CONCLAVE_MAX_DEBATE_ROUNDS") {
            cfg.max_debate_rounds = parse_env("CONCLAVE_MAX_DEBATE_ROUNDS", &v, "u32")?;
        }
        if let Ok(v) = std::env::var("CONCLAVE_MAX_RISK_DISCUSS_ROUNDS") {
            cfg.max_risk_discuss_rounds = parse_env("CONCLAVE_MAX_RISK_DISCUSS_ROUNDS", &v, "u32")?;
        }
        if let Ok(v) = std::env::var("CONCLAVE_RECURSION_LIMIT") {
            cfg.recursion_limit = parse_env("CONCLAVE_RECURSION_LIMIT", &v, "u32")?;
        }
        if let Ok(v) = std::env::var("CONCLAVE_EXECUTION_TIMEOUT_SECS") {
            let secs: u64 = parse_env("CONCLAVE_EXECUTION_TIMEOUT_SECS", &v, "u64")?;
            cfg.execution_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = std::env::var("CONCLAVE_FORCE_CONSENSUS_THRESHOLD") {
            cfg.force_consensus_threshold =
                parse_env("CONCLAVE_FORCE_CONSENSUS_THRESHOLD", &v, "f64")?;
        }
        if let Ok(v) = std::env::var("CONCLAVE_CIRCUIT_BREAKER_ENABLED") {
            cfg.circuit_breaker_enabled = parse_env("CONCLAVE_CIRCUIT_BREAKER_ENABLED", &v, "bool")?;
        }
        if let Ok(v) = std::env::var("CONCLAVE_TOOL_TIMEOUT_SECS") {
            let secs: u64 = parse_env("CONCLAVE_TOOL_TIMEOUT_SECS", &v, "u64")?;
            cfg.tool_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = std::env::var("CONCLAVE_TOOL_RETRY_ATTEMPTS") {
            cfg.tool_retry_attempts = parse_env("CONCLAVE_TOOL_RETRY_ATTEMPTS", &v, "u32")?;
        }
        if let Ok(v) = std::env::var("CONCLAVE_ONLINE_TOOLS") {
            cfg.online_tools = parse_env("CONCLAVE_ONLINE_TOOLS", &v, "bool")?;
        }
        if let Ok(v) = std::env::var("CONCLAVE_CACHE_ENABLED") {
            cfg.cache_enabled = parse_env("CONCLAVE_CACHE_ENABLED", &v, "bool")?;
        }
        if let Ok(v) = std::env::var("CONCLAVE_MAX_PARALLEL_AGENTS") {
            cfg.max_parallel_agents = parse_env("CONCLAVE_MAX_PARALLEL_AGENTS", &v, "u32")?;
        }

        Ok(cfg)
    }

    /// Layers caller-supplied per-call overrides on top of `self`, returning
    /// the final immutable config for one run.
    pub fn merge_options(&self, options: &AnalyzeOptions) -> Self {
        let mut cfg = self.clone();
        if let Some(v) = options.max_debate_rounds {
            cfg.max_debate_rounds = v;
        }
        if let Some(v) = options.max_risk_rounds {
            cfg.max_risk_discuss_rounds = v;
        }
        if let Some(v) = options.recursion_limit {
            cfg.recursion_limit = v;
        }
        if let Some(v) = options.deadline_seconds {
            cfg.execution_timeout = Duration::from_secs(v);
        }
        if let Some(overrides) = &options.per_analyst_quota_overrides {
            if let Some(v) = overrides.get("market") {
                cfg.quotas.market = *v;
            }
            if let Some(v) = overrides.get("social") {
                cfg.quotas.social = *v;
            }
            if let Some(v) = overrides.get("news") {
                cfg.quotas.news = *v;
            }
            if let Some(v) = overrides.get("fundamentals") {
                cfg.quotas.fundamentals = *v;
            }
        }
        if let Some(v) = options.enable_cache {
            cfg.cache_enabled = v;
            cfg.enable_tool_cache = v;
        }
        if let Some(v) = options.enable_circuit_breakers {
            cfg.circuit_breaker_enabled = v;
        }
        cfg
    }
}

fn parse_env<T: std::str::FromStr>(
    name: &str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvVar {
        name: name.to_string(),
        expected,
        value: value.to_string(),
    })
}

/// Per-call overrides accepted by the Caller API (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    pub max_debate_rounds: Option<u32>,
    pub max_risk_rounds: Option<u32>,
    pub recursion_limit: Option<u32>,
    pub deadline_seconds: Option<u64>,
    pub per_analyst_quota_overrides: Option<HashMap<String, u32>>,
    pub enable_cache: Option<bool>,
    pub enable_circuit_breakers: Option<bool>,
    /// Overrides the default focus-routing keyword table (spec §4.7,
    /// SPEC_FULL.md §F.3). `None` uses [`crate::debate::default_focus_table`].
    pub focus_keyword_overrides: Option<Vec<(String, Vec<String>)>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_brackets() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_debate_rounds, 1);
        assert_eq!(cfg.max_risk_discuss_rounds, 1);
        assert_eq!(cfg.recursion_limit, 50);
        assert_eq!(cfg.execution_timeout, Duration::from_secs(1200));
        assert_eq!(cfg.force_consensus_threshold, 7.0);
        assert!(cfg.circuit_breaker_enabled);
        assert_eq!(cfg.quotas.market, 20);
        assert_eq!(cfg.quotas.social, 3);
        assert_eq!(cfg.tool_timeout, Duration::from_secs(15));
        assert_eq!(cfg.tool_retry_attempts, 2);
        assert_eq!(cfg.cache_ttls.quote_secs, 300);
        assert_eq!(cfg.cache_ttls.fundamentals_secs, 3600);
        assert_eq!(cfg.max_parallel_agents, 4);
    }

    #[test]
    fn merge_options_overrides_selected_fields_only() {
        let base = EngineConfig::default();
        let mut overrides = HashMap::new();
        overrides.insert("market".to_string(), 5u32);
        let options = AnalyzeOptions {
            max_debate_rounds: Some(3),
            per_analyst_quota_overrides: Some(overrides),
            ..Default::default()
        };
        let merged = base.merge_options(&options);
        assert_eq!(merged.max_debate_rounds, 3);
        assert_eq!(merged.quotas.market, 5);
        assert_eq!(merged.quotas.social, base.quotas.social);
        assert_eq!(merged.recursion_limit, base.recursion_limit);
    }
}
