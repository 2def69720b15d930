//! A travel-planning agent descriptor.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an Anthropic backend.
//! - A tool interface (`Tool` and `ToolRegistry`) and the Open-Meteo `WeatherTool`.
//! - An immutable `Agent` descriptor and the `travel_agent` factories that build it.

mod agent;
mod config;
mod error;
mod llm;
mod logging;
mod message;
mod tool;
pub mod tools;
mod travel;

pub use agent::{Agent, AgentConfig, AgentSummary};
pub use config::{AppConfig, LoggingConfig, ProviderConfig, WeatherConfig};
pub use error::{AgentError, Result};
pub use llm::{AnthropicClient, AnthropicProvider, LanguageModel, ModelCompletion, StubModel};
pub use logging::init_tracing;
pub use message::{Message, Role, ToolCall, ToolResult};
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use tools::{WeatherReport, WeatherTool, WEATHER_TOOL_NAME};
pub use travel::{
    travel_agent, travel_agent_from_config, TRAVEL_AGENT_INSTRUCTIONS, TRAVEL_AGENT_MODEL,
    TRAVEL_AGENT_NAME,
};
