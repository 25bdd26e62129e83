//! Graph Builder (spec §4.6): assembles nodes and edges into the concrete
//! pipeline described by spec §2's control/data flow, via dependency
//! injection of the registry and every agent capability (spec §9: "the
//! Graph Builder receives the registry and capability, and every node takes
//! its collaborators as construction parameters").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentCapability, AgentRunner};
use crate::config::EngineConfig;
use crate::debate::{self, DebateExitReason, DebateThresholds};
use crate::state::{AnalystKind, RiskPerspective, RunState};
use crate::tools::{ToolInvoker, ToolRegistry};

use super::dispatch::{AggregatorNode, DispatcherNode, RiskAggregatorNode, RiskDispatcherNode};
use super::node::{
    AnalystNode, BearNode, BullNode, DebateJudgeNode, Node, NodeId, ResearchManagerNode, RiskJudgeNode,
    RiskNode, ToolsNode, TraderNode,
};

/// Every agent capability the pipeline needs, injected by the caller (spec
/// §1: agent prompting/content is out of scope; §6: the capability contract
/// is the only seam). Analyst tool visibility is injected alongside.
pub struct AgentSet {
    pub market: Arc<dyn AgentCapability>,
    pub social: Arc<dyn AgentCapability>,
    pub news: Arc<dyn AgentCapability>,
    pub fundamentals: Arc<dyn AgentCapability>,
    pub bull: Arc<dyn AgentCapability>,
    pub bear: Arc<dyn AgentCapability>,
    pub debate_judge: Arc<dyn AgentCapability>,
    pub research_manager: Arc<dyn AgentCapability>,
    pub trader: Arc<dyn AgentCapability>,
    pub risk_aggressive: Arc<dyn AgentCapability>,
    pub risk_conservative: Arc<dyn AgentCapability>,
    pub risk_neutral: Arc<dyn AgentCapability>,
    pub risk_judge: Arc<dyn AgentCapability>,
}

impl AgentSet {
    fn analyst(&self, kind: AnalystKind) -> Arc<dyn AgentCapability> {
        match kind {
            AnalystKind::Market => self.market.clone(),
            AnalystKind::Social => self.social.clone(),
            AnalystKind::News => self.news.clone(),
            AnalystKind::Fundamentals => self.fundamentals.clone(),
        }
    }

    fn risk(&self, perspective: RiskPerspective) -> Arc<dyn AgentCapability> {
        match perspective {
            RiskPerspective::Aggressive => self.risk_aggressive.clone(),
            RiskPerspective::Conservative => self.risk_conservative.clone(),
            RiskPerspective::Neutral => self.risk_neutral.clone(),
        }
    }
}

/// Which tool names are visible to each analyst kind. The engine doesn't
/// ship data-source adapters (spec §1 non-goal), so callers register tools
/// under whatever names they like; this table is the default visibility
/// assignment and may be overridden by constructing [`Graph`] fields
/// directly for unusual topologies.
pub fn default_tool_visibility() -> HashMap<AnalystKind, Vec<String>> {
    let mut map = HashMap::new();
    map.insert(
        AnalystKind::Market,
        vec!["get_quote".to_string(), "get_indicators".to_string()],
    );
    map.insert(AnalystKind::Social, vec!["get_social_sentiment".to_string()]);
    map.insert(AnalystKind::News, vec!["get_news".to_string()]);
    map.insert(AnalystKind::Fundamentals, vec!["get_fundamentals".to_string()]);
    map
}

/// The assembled pipeline: a node table, required-arrival counts for
/// barrier nodes, the edge function, and the initial ready set.
pub struct Graph {
    pub nodes: HashMap<NodeId, Arc<dyn Node>>,
    pub required_arrivals: HashMap<NodeId, usize>,
    pub start_successors: Vec<NodeId>,
    edge_fn: Box<dyn Fn(NodeId, &RunState) -> Vec<NodeId> + Send + Sync>,
}

impl Graph {
    pub fn successors(&self, completed: NodeId, state: &RunState) -> Vec<NodeId> {
        (self.edge_fn)(completed, state)
    }
}

/// Builds the fixed pipeline topology of spec §4.6 from injected
/// collaborators.
pub struct GraphBuilder {
    pub config: EngineConfig,
    pub agents: AgentSet,
    pub registry: Arc<ToolRegistry>,
    pub invoker: Arc<ToolInvoker>,
    pub tool_visibility: HashMap<AnalystKind, Vec<String>>,
    pub focus_table: Vec<(String, Vec<String>)>,
    pub agent_timeout: Duration,
}

impl GraphBuilder {
    pub fn build(self) -> Graph {
        let mut nodes: HashMap<NodeId, Arc<dyn Node>> = HashMap::new();
        nodes.insert(NodeId::Dispatcher, Arc::new(DispatcherNode));
        nodes.insert(NodeId::Aggregator, Arc::new(AggregatorNode));
        nodes.insert(NodeId::RiskDispatcher, Arc::new(RiskDispatcherNode));
        nodes.insert(NodeId::RiskAggregator, Arc::new(RiskAggregatorNode));

        for kind in AnalystKind::ALL {
            let runner = AgentRunner::new(self.agents.analyst(kind), self.agent_timeout);
            let tool_names = self.tool_visibility.get(&kind).cloned().unwrap_or_default();
            nodes.insert(
                NodeId::Analyst(kind),
                Arc::new(AnalystNode {
                    kind,
                    runner,
                    tool_names,
                    registry: self.registry.clone(),
                    quota: self.config.quotas.get(kind),
                }),
            );
            nodes.insert(
                NodeId::Tools(kind),
                Arc::new(ToolsNode {
                    kind,
                    invoker: self.invoker.clone(),
                    quota: self.config.quotas.get(kind),
                }),
            );
        }

        nodes.insert(
            NodeId::Bull,
            Arc::new(BullNode {
                runner: AgentRunner::new(self.agents.bull.clone(), self.agent_timeout),
            }),
        );
        nodes.insert(
            NodeId::Bear,
            Arc::new(BearNode {
                runner: AgentRunner::new(self.agents.bear.clone(), self.agent_timeout),
            }),
        );
        nodes.insert(
            NodeId::DebateJudge,
            Arc::new(DebateJudgeNode {
                runner: AgentRunner::new(self.agents.debate_judge.clone(), self.agent_timeout),
                focus_table: self.focus_table.clone(),
                early_consensus_threshold: self.config.force_consensus_threshold,
            }),
        );
        nodes.insert(
            NodeId::ResearchManager,
            Arc::new(ResearchManagerNode {
                runner: AgentRunner::new(self.agents.research_manager.clone(), self.agent_timeout),
            }),
        );
        nodes.insert(
            NodeId::Trader,
            Arc::new(TraderNode {
                runner: AgentRunner::new(self.agents.trader.clone(), self.agent_timeout),
            }),
        );
        for perspective in RiskPerspective::ALL {
            nodes.insert(
                NodeId::Risk(perspective),
                Arc::new(RiskNode {
                    perspective,
                    runner: AgentRunner::new(self.agents.risk(perspective), self.agent_timeout),
                }),
            );
        }
        nodes.insert(
            NodeId::RiskJudge,
            Arc::new(RiskJudgeNode {
                runner: AgentRunner::new(self.agents.risk_judge.clone(), self.agent_timeout),
            }),
        );

        let mut required_arrivals = HashMap::new();
        required_arrivals.insert(NodeId::Aggregator, AnalystKind::ALL.len());
        required_arrivals.insert(NodeId::RiskAggregator, RiskPerspective::ALL.len());

        let thresholds = DebateThresholds {
            early_consensus_threshold: self.config.force_consensus_threshold,
            ..DebateThresholds::default()
        };

        let start_successors = vec![NodeId::Dispatcher];

        let edge_fn = Box::new(move |completed: NodeId, state: &RunState| -> Vec<NodeId> {
            match completed {
                NodeId::Dispatcher => AnalystKind::ALL.iter().map(|k| NodeId::Analyst(*k)).collect(),
                NodeId::Analyst(kind) => {
                    let channel = state.channels.get(&kind);
                    let has_pending_tool_requests = channel
                        .and_then(|c| c.last_assistant_tool_requests())
                        .map(|r| !r.is_empty())
                        .unwrap_or(false);
                    if has_pending_tool_requests {
                        vec![NodeId::Tools(kind)]
                    } else {
                        vec![NodeId::Aggregator]
                    }
                }
                NodeId::Tools(kind) => vec![NodeId::Analyst(kind)],
                NodeId::Aggregator => vec![NodeId::Bull],
                NodeId::Bull => vec![NodeId::Bear],
                NodeId::Bear => vec![NodeId::DebateJudge],
                NodeId::DebateJudge => match debate::decide_exit(&state.debate, &thresholds, chrono::Utc::now()) {
                    DebateExitReason::Continue => vec![NodeId::Bull],
                    _ => vec![NodeId::ResearchManager],
                },
                NodeId::ResearchManager => vec![NodeId::Trader],
                NodeId::Trader => vec![NodeId::RiskDispatcher],
                NodeId::RiskDispatcher => RiskPerspective::ALL.iter().map(|p| NodeId::Risk(*p)).collect(),
                NodeId::Risk(_) => vec![NodeId::RiskAggregator],
                NodeId::RiskAggregator => vec![NodeId::RiskJudge],
                NodeId::RiskJudge => vec![],
            }
        });

        Graph {
            nodes,
            required_arrivals,
            start_successors,
            edge_fn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tool_visibility_covers_every_analyst_kind() {
        let visibility = default_tool_visibility();
        for kind in AnalystKind::ALL {
            assert!(visibility.contains_key(&kind));
        }
    }
}
