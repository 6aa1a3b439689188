//! Fixed tool catalog keyed by name.

use super::{Tool, ToolDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct Entry {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
}

/// Tool catalog. Filled once at startup, read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its definition name. A later registration with
    /// the same name replaces the earlier one.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let definition = tool.definition();
        debug!("Registered tool {}", definition.name);
        self.tools
            .insert(definition.name.clone(), Entry { definition, tool });
    }

    pub fn lookup(&self, name: &str) -> Option<(Arc<dyn Tool>, &ToolDefinition)> {
        self.tools
            .get(name)
            .map(|entry| (Arc::clone(&entry.tool), &entry.definition))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Catalog metadata, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|e| e.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions().into_iter().map(|d| d.name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::{empty_schema, NoParams, Probe};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Fixed {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Probe for Fixed {
        type Params = NoParams;

        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            self.description
        }

        fn parameters_schema(&self) -> Value {
            empty_schema()
        }

        async fn run(&self, _params: NoParams) -> Result<Value, ToolError> {
            Ok(json!({"from": self.description}))
        }
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(Fixed {
            name: "show_status",
            description: "first",
        });
        registry.register(Fixed {
            name: "show_status",
            description: "second",
        });

        assert_eq!(registry.len(), 1);
        let (tool, def) = registry.lookup("show_status").unwrap();
        assert_eq!(def.description, "second");
        assert_eq!(tool.execute(&json!({})).await.unwrap()["from"], "second");
    }

    #[test]
    fn definitions_are_sorted_and_lookup_misses_are_none() {
        let mut registry = ToolRegistry::new();
        registry.register(Fixed {
            name: "show_status",
            description: "s",
        });
        registry.register(Fixed {
            name: "innodb_trx",
            description: "t",
        });

        assert_eq!(registry.names(), vec!["innodb_trx", "show_status"]);
        assert!(registry.lookup("slow_query_analysis").is_none());
        assert!(!registry.contains("slow_query_analysis"));
    }
}
