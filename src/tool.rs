use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// A callable capability the model may invoke during a conversation turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Optionally return a JSON Schema object describing the expected arguments.
    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn call(&self, input: Value) -> Result<Value>;
}

/// Static description of a tool, as sent to a model backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
}

impl ToolDescription {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
        }
    }
}

/// Mapping from tool name to a shared tool handle.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers `tool` under its declared name, replacing any previous entry.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Registers an existing handle under an explicit key.
    ///
    /// The key is not compared with the handle's declared name here; the
    /// agent constructor performs that check.
    pub fn insert(&mut self, key: impl Into<String>, tool: Arc<dyn Tool>) -> Result<()> {
        match self.tools.entry(key.into()) {
            Entry::Occupied(entry) => Err(AgentError::DuplicateTool(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(tool);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Tool>)> {
        self.tools.iter().map(|(key, tool)| (key.as_str(), tool))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        let mut descriptions: Vec<ToolDescription> = self
            .tools
            .values()
            .map(|tool| ToolDescription::of(tool.as_ref()))
            .collect();

        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }

    pub async fn call(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.call(input).await.map_err(|err| match err {
            err @ AgentError::ToolInvocation { .. } => err,
            other => AgentError::ToolInvocation {
                name: name.to_string(),
                source: Box::new(other),
            },
        })
    }
}

/// Two registries are equal when they hold the same handles under the same keys.
impl PartialEq for ToolRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.tools.len() == other.tools.len()
            && self.tools.iter().all(|(key, tool)| {
                other
                    .tools
                    .get(key)
                    .is_some_and(|theirs| std::ptr::addr_eq(Arc::as_ptr(tool), Arc::as_ptr(theirs)))
            })
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct First;
    struct Second;
    struct Failing;

    #[async_trait]
    impl Tool for First {
        fn name(&self) -> &str {
            "a_first"
        }

        fn description(&self) -> &str {
            "First tool"
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    #[async_trait]
    impl Tool for Second {
        fn name(&self) -> &str {
            "second"
        }

        fn description(&self) -> &str {
            "Second tool"
        }

        fn parameters(&self) -> Option<Value> {
            Some(json!({"type": "object"}))
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(AgentError::Protocol("boom".into()))
        }
    }

    #[tokio::test]
    async fn returns_sorted_descriptions() {
        let mut registry = ToolRegistry::new();
        registry.register(Second);
        registry.register(First);

        let names: Vec<String> = registry.describe().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a_first", "second"]);
        assert_eq!(registry.names(), vec!["a_first", "second"]);
        assert_eq!(
            registry.describe()[1].parameters,
            Some(json!({"type": "object"}))
        );
    }

    #[test]
    fn insert_rejects_duplicate_keys() {
        let mut registry = ToolRegistry::new();
        registry.insert("second", Arc::new(Second)).unwrap();

        let err = registry.insert("second", Arc::new(Second)).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(key) if key == "second"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn insert_keeps_the_given_handle() {
        let handle: Arc<dyn Tool> = Arc::new(First);
        let mut registry = ToolRegistry::new();
        registry.insert("a_first", Arc::clone(&handle)).unwrap();

        let stored = registry.get("a_first").unwrap();
        assert!(std::ptr::addr_eq(Arc::as_ptr(stored), Arc::as_ptr(&handle)));
    }

    #[test]
    fn equality_compares_handles_not_names() {
        let handle: Arc<dyn Tool> = Arc::new(First);
        let mut left = ToolRegistry::new();
        left.insert("a_first", Arc::clone(&handle)).unwrap();
        let mut right = ToolRegistry::new();
        right.insert("a_first", handle).unwrap();
        assert_eq!(left, right);

        let mut other = ToolRegistry::new();
        other.insert("a_first", Arc::new(First)).unwrap();
        assert_ne!(left, other);
    }

    #[tokio::test]
    async fn call_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(First);

        let output = registry.call("a_first", json!({"x": 1})).await.unwrap();
        assert_eq!(output, json!({"x": 1}));

        let missing = registry.call("nope", json!({})).await.unwrap_err();
        assert!(matches!(missing, AgentError::ToolNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn call_wraps_failures_with_the_tool_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Failing);

        let err = registry.call("failing", json!({})).await.unwrap_err();
        match err {
            AgentError::ToolInvocation { name, source } => {
                assert_eq!(name, "failing");
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
