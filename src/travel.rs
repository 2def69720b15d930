//! The travel-planning agent.
//!
//! It asks the user about their preferences and constraints, always checks
//! the weather at the destination, and proposes a plan suited to it.

use std::sync::Arc;

use crate::agent::{Agent, AgentConfig};
use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::{AnthropicProvider, LanguageModel};
use crate::tool::{Tool, ToolRegistry};
use crate::tools::{WeatherTool, WEATHER_TOOL_NAME};

pub const TRAVEL_AGENT_NAME: &str = "travel-agent";

pub const TRAVEL_AGENT_MODEL: &str = "claude-4-sonnet-20250514";

pub const TRAVEL_AGENT_INSTRUCTIONS: &str = "ユーザーの旅行の計画を手伝うエージェントです。
  旅行の計画を立てるために、ユーザーの希望や条件を聞き出し、最適な旅行プランを提案します。
  必ず旅行先の天気を確認したうえで、天候に応じた旅行プランを提案してください。";

/// Builds the travel agent from already-constructed handles.
///
/// `weather_tool` is registered under `weatherTool` and must declare that name.
pub fn travel_agent(model: Arc<dyn LanguageModel>, weather_tool: Arc<dyn Tool>) -> Result<Agent> {
    let mut tools = ToolRegistry::new();
    tools.insert(WEATHER_TOOL_NAME, weather_tool)?;

    Agent::new(
        AgentConfig::new(TRAVEL_AGENT_NAME, TRAVEL_AGENT_INSTRUCTIONS, model).with_tools(tools),
    )
}

/// Builds the Anthropic model handle and the weather tool from `config`.
pub fn travel_agent_from_config(config: &AppConfig) -> Result<Agent> {
    let provider = AnthropicProvider::new(config.anthropic.clone())?;
    let model = provider.language_model(TRAVEL_AGENT_MODEL);
    let weather_tool = Arc::new(WeatherTool::new(config.weather.clone())?);

    let agent = travel_agent(model, weather_tool)?;
    tracing::info!(
        agent = agent.name(),
        model = TRAVEL_AGENT_MODEL,
        endpoint = %config.anthropic.endpoint,
        "travel agent ready"
    );
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_keep_their_layout() {
        let lines: Vec<&str> = TRAVEL_AGENT_INSTRUCTIONS.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ユーザーの旅行の計画を手伝うエージェントです。");
        assert!(lines[1].starts_with("  旅行の計画を立てるために"));
        assert!(lines[2].starts_with("  必ず旅行先の天気を確認"));
        assert!(!TRAVEL_AGENT_INSTRUCTIONS.ends_with('\n'));
    }

    #[test]
    fn builds_from_default_config_without_credentials() {
        let agent = travel_agent_from_config(&AppConfig::default()).unwrap();

        assert_eq!(agent.name(), TRAVEL_AGENT_NAME);
        assert_eq!(agent.model().provider(), "anthropic");
        assert_eq!(agent.model().model_id(), TRAVEL_AGENT_MODEL);
        assert_eq!(agent.tools().names(), vec![WEATHER_TOOL_NAME]);
    }
}
