//! Tool Registry: name → tool descriptor (spec §4.2).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ClassifiedFailure;

/// Whether a tool may have side effects. Read-only tools are the common case
/// (quote lookups, news search); side-effectful tools exist for completeness
/// of the registry shape but this engine does not ship any (spec §1 excludes
/// individual data-source adapters from core scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    ReadOnly,
    SideEffectful,
}

/// The tool handler contract consumed by the engine (spec §6 "Tool
/// handler"). Implementations live outside this crate; `conclave` only
/// specifies and drives this trait.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ClassifiedFailure>;
}

/// A boxed, type-erased handler plus its registration metadata.
pub struct ToolDescriptor {
    pub name: String,
    pub schema: serde_json::Value,
    pub handler: Box<dyn ToolHandler>,
    pub classification: Classification,
    pub default_ttl: Duration,
    pub breaker_group: String,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("classification", &self.classification)
            .field("default_ttl", &self.default_ttl)
            .field("breaker_group", &self.breaker_group)
            .finish()
    }
}

/// Registry of callable tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Schemas for the named tools, in the order requested, skipping any
    /// name that isn't registered. Used to build the `tool_schemas` an
    /// [`crate::agent::AgentCapability`] is called with.
    pub fn schemas_for(&self, names: &[&str]) -> Vec<serde_json::Value> {
        names
            .iter()
            .filter_map(|name| self.tools.get(*name).map(|d| d.schema.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn handle(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ClassifiedFailure> {
            Ok(arguments.clone())
        }
    }

    #[test]
    fn register_and_lookup_round_trips() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor {
            name: "get_quote".into(),
            schema: serde_json::json!({"type": "object"}),
            handler: Box::new(EchoHandler),
            classification: Classification::ReadOnly,
            default_ttl: Duration::from_secs(300),
            breaker_group: "market-data".into(),
        });
        assert!(registry.contains("get_quote"));
        assert!(!registry.contains("unknown_tool"));
        assert_eq!(registry.get("get_quote").unwrap().breaker_group, "market-data");
        assert_eq!(registry.schemas_for(&["get_quote", "missing"]).len(), 1);
    }
}
