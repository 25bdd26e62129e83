//! Debate Controller (spec §4.7): bull/bear iterative exchange with a round
//! cap, early-consensus detection, and focus-hinting between rounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::DebateState;

/// Why the debate stopped continuing (spec §4.7 "Early termination
/// outcomes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebateExitReason {
    EarlyConsensus,
    PerformanceCutoff,
    MaxRoundsReached,
    ConsensusFlagSet,
    Continue,
}

/// Tunables governing continuation (mirrors the relevant slice of
/// [`crate::config::EngineConfig`]).
#[derive(Debug, Clone, Copy)]
pub struct DebateThresholds {
    pub early_consensus_threshold: f64,
    pub performance_cutoff_quality_floor: f64,
    /// Round number from which `PERFORMANCE_CUTOFF` becomes eligible ("by
    /// round 2" in spec §4.7).
    pub soft_cap_round: u32,
    /// Cumulative wall-clock budget for the debate; past this, a low quality
    /// score triggers `PERFORMANCE_CUTOFF` instead of another round.
    pub soft_cap: std::time::Duration,
}

impl Default for DebateThresholds {
    fn default() -> Self {
        Self {
            early_consensus_threshold: 8.5,
            performance_cutoff_quality_floor: 5.0,
            soft_cap_round: 2,
            soft_cap: std::time::Duration::from_secs(45),
        }
    }
}

/// Decides whether the debate should continue after the round just
/// completed, per spec §4.7's continuation predicate and early-termination
/// outcomes. `now` is passed in rather than read internally so the decision
/// stays a pure function of its inputs.
pub fn decide_exit(debate: &DebateState, thresholds: &DebateThresholds, now: DateTime<Utc>) -> DebateExitReason {
    if debate.consensus {
        return DebateExitReason::ConsensusFlagSet;
    }
    let elapsed = debate
        .started_at
        .map(|started| now - started)
        .and_then(|d| d.to_std().ok())
        .unwrap_or_default();
    if let Some(score) = debate.last_quality_score {
        if score >= thresholds.early_consensus_threshold {
            return DebateExitReason::EarlyConsensus;
        }
        if debate.current_round >= thresholds.soft_cap_round
            && elapsed >= thresholds.soft_cap
            && score < thresholds.performance_cutoff_quality_floor
        {
            return DebateExitReason::PerformanceCutoff;
        }
    }
    if debate.current_round >= debate.max_rounds {
        return DebateExitReason::MaxRoundsReached;
    }
    DebateExitReason::Continue
}

/// The closed set of next-round focus hints (spec §4.7).
pub const FOCUS_VALUES: [&str; 6] = [
    "data-evidence",
    "risk-analysis",
    "valuation",
    "competitive-analysis",
    "deep-fundamentals",
    "synthesis",
];

/// Default keyword table grounded on `debate_optimizer.py` (SPEC_FULL.md
/// §F.3), resolving the spec's open question on the feedback-to-focus
/// mapping. Checked in order; the first matching focus wins.
pub fn default_focus_table() -> Vec<(String, Vec<String>)> {
    vec![
        (
            "data-evidence".to_string(),
            vec!["data".to_string(), "evidence".to_string(), "number".to_string()],
        ),
        (
            "risk-analysis".to_string(),
            vec!["risk".to_string(), "downside".to_string()],
        ),
        (
            "valuation".to_string(),
            vec![
                "valuation".to_string(),
                "price target".to_string(),
                "multiple".to_string(),
            ],
        ),
        (
            "competitive-analysis".to_string(),
            vec!["competit".to_string(), "moat".to_string(), "market share".to_string()],
        ),
        (
            "deep-fundamentals".to_string(),
            vec![
                "fundamental".to_string(),
                "balance sheet".to_string(),
                "cash flow".to_string(),
            ],
        ),
    ]
}

/// Routes judge feedback text to one of [`FOCUS_VALUES`] using `table`
/// (falling back to `"synthesis"` when nothing matches).
pub fn route_focus(feedback: &str, table: &[(String, Vec<String>)]) -> String {
    let lowered = feedback.to_lowercase();
    for (focus, keywords) in table {
        if keywords.iter().any(|kw| lowered.contains(kw.as_str())) {
            return focus.clone();
        }
    }
    "synthesis".to_string()
}

/// Deterministic fallback plan when the debate exhausts its rounds without
/// any usable exchange (spec §4.7 "Failure semantics").
pub const FALLBACK_INVESTMENT_PLAN: &str = "HOLD — insufficient debate";

#[cfg(test)]
mod tests {
    use super::*;

    fn debate(round: u32, max: u32, score: Option<f64>, consensus: bool) -> DebateState {
        DebateState {
            current_round: round,
            max_rounds: max,
            last_quality_score: score,
            consensus,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    #[test]
    fn continues_when_nothing_triggers_exit() {
        let d = debate(1, 5, Some(3.0), false);
        assert_eq!(
            decide_exit(&d, &DebateThresholds::default(), Utc::now()),
            DebateExitReason::Continue
        );
    }

    #[test]
    fn early_consensus_when_score_meets_threshold() {
        let d = debate(1, 5, Some(9.0), false);
        assert_eq!(
            decide_exit(&d, &DebateThresholds::default(), Utc::now()),
            DebateExitReason::EarlyConsensus
        );
    }

    #[test]
    fn max_rounds_reached_takes_effect_at_cap() {
        let d = debate(1, 1, Some(3.0), false);
        assert_eq!(
            decide_exit(&d, &DebateThresholds::default(), Utc::now()),
            DebateExitReason::MaxRoundsReached
        );
    }

    #[test]
    fn consensus_flag_short_circuits_everything() {
        let d = debate(0, 5, None, true);
        assert_eq!(
            decide_exit(&d, &DebateThresholds::default(), Utc::now()),
            DebateExitReason::ConsensusFlagSet
        );
    }

    #[test]
    fn performance_cutoff_after_soft_cap_round_with_low_quality_and_elapsed_time() {
        let d = debate(2, 5, Some(2.0), false);
        let thresholds = DebateThresholds::default();
        let past_cap = d.started_at.unwrap() + chrono::Duration::from_std(thresholds.soft_cap).unwrap();
        assert_eq!(
            decide_exit(&d, &thresholds, past_cap),
            DebateExitReason::PerformanceCutoff
        );
    }

    #[test]
    fn low_quality_past_round_cap_but_within_time_budget_still_continues() {
        let d = debate(2, 5, Some(2.0), false);
        assert_eq!(
            decide_exit(&d, &DebateThresholds::default(), Utc::now()),
            DebateExitReason::Continue
        );
    }

    #[test]
    fn focus_routing_matches_expected_keywords() {
        let table = default_focus_table();
        assert_eq!(route_focus("we need more data and evidence", &table), "data-evidence");
        assert_eq!(route_focus("the downside risk is high", &table), "risk-analysis");
        assert_eq!(route_focus("what about the price target", &table), "valuation");
        assert_eq!(route_focus("the competitive moat is strong", &table), "competitive-analysis");
        assert_eq!(route_focus("check the balance sheet", &table), "deep-fundamentals");
        assert_eq!(route_focus("looks fine overall", &table), "synthesis");
    }
}
