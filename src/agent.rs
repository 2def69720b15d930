use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{AgentError, Result};
use crate::llm::LanguageModel;
use crate::tool::{Tool, ToolDescription, ToolRegistry};

/// The four fields an agent is built from.
pub struct AgentConfig {
    pub name: String,
    pub instructions: String,
    pub model: Arc<dyn LanguageModel>,
    pub tools: ToolRegistry,
}

impl AgentConfig {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model,
            tools: ToolRegistry::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }
}

/// An immutable agent descriptor: name, instructions, model handle and tools.
///
/// Fields are only reachable through shared references, so a constructed
/// agent can be handed to any number of consumers without synchronisation.
/// Running conversations against it is left to the caller.
#[derive(Clone)]
pub struct Agent {
    name: String,
    instructions: String,
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
}

impl Agent {
    /// Validates and freezes `config`.
    ///
    /// Rejects an empty name, blank instructions, and any tool registered
    /// under a key other than its declared name.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let AgentConfig {
            name,
            instructions,
            model,
            tools,
        } = config;

        if name.is_empty() {
            return Err(AgentError::InvalidAgent("name must not be empty".into()));
        }
        if instructions.trim().is_empty() {
            return Err(AgentError::InvalidAgent(format!(
                "instructions for `{name}` must not be empty"
            )));
        }
        for (key, tool) in tools.iter() {
            if key != tool.name() {
                return Err(AgentError::ToolNameMismatch {
                    key: key.to_string(),
                    declared: tool.name().to_string(),
                });
            }
        }

        tracing::debug!(
            agent = %name,
            provider = model.provider(),
            model = model.model_id(),
            tools = ?tools.names(),
            "constructed agent"
        );

        Ok(Self {
            name,
            instructions,
            model,
            tools,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            name: self.name.clone(),
            instructions: self.instructions.clone(),
            provider: self.model.provider().to_string(),
            model: self.model.model_id().to_string(),
            tools: self.tools.describe(),
        }
    }
}

/// Agents compare equal when their fields match and they share the same handles.
impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.instructions == other.instructions
            && std::ptr::addr_eq(Arc::as_ptr(&self.model), Arc::as_ptr(&other.model))
            && self.tools == other.tools
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("provider", &self.model.provider())
            .field("model", &self.model.model_id())
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

/// Serialisable snapshot of an agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub instructions: String,
    pub provider: String,
    pub model: String,
    pub tools: Vec<ToolDescription>,
}
