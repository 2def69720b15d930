//! Language model abstractions and the Anthropic Messages backend.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::{AgentError, Result};
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolDescription;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelCompletion {
    fn new(content: String, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
        }
    }
}

/// A callable chat completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short provider identifier, e.g. `anthropic`.
    fn provider(&self) -> &str;

    /// The model-version identifier this handle was created for.
    fn model_id(&self) -> &str;

    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
        stream: bool,
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> AgentError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AgentError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    AgentError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

/// Owns Anthropic credentials and an HTTP client, and hands out model handles.
#[derive(Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    config: Arc<ProviderConfig>,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| AgentError::LanguageModel(format!("http client error: {err}")))?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Provider factory: returns a shareable handle for `model_id`.
    ///
    /// The API key is only checked when a request is made.
    pub fn language_model(&self, model_id: impl Into<String>) -> Arc<dyn LanguageModel> {
        Arc::new(self.client(model_id))
    }

    pub fn client(&self, model_id: impl Into<String>) -> AnthropicClient {
        AnthropicClient {
            http: self.http.clone(),
            model: model_id.into(),
            config: Arc::clone(&self.config),
        }
    }
}

impl fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("endpoint", &self.config.endpoint)
            .field("has_api_key", &self.config.api_key.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    model: String,
    config: Arc<ProviderConfig>,
}

impl AnthropicClient {
    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AgentError::LanguageModel("missing Anthropic API key in model config".into())
            })
    }

    /// Streaming is used when the caller asks for it or the provider config enables it.
    fn streams(&self, requested: bool) -> bool {
        requested || self.config.stream
    }

    fn request_body<'a>(
        &'a self,
        messages: &[Message],
        tools: &[ToolDescription],
        stream: bool,
    ) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.model,
            max_tokens: self.config.max_tokens,
            system: system_prompt(messages),
            messages: to_messages(messages),
            tools: to_tools(tools),
            stream,
        }
    }
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.model)
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
        stream: bool,
    ) -> Result<ModelCompletion> {
        let api_key = self.api_key()?;
        let stream = self.streams(stream);
        let payload = self.request_body(messages, tools, stream);
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            stream,
            "sending anthropic request"
        );

        let resp = self
            .http
            .post(&self.config.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|err| AgentError::LanguageModel(format!("Anthropic request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(model = %self.model, %status, "anthropic request rejected");
            return Err(coalesce_error(status, &body, "anthropic"));
        }

        if stream {
            let mut accumulator = StreamAccumulator::default();
            let mut chunks = resp.bytes_stream();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(|err| {
                    AgentError::LanguageModel(format!("Anthropic stream error: {err}"))
                })?;
                accumulator.feed(&chunk)?;
            }
            return accumulator.finish();
        }

        let parsed: AnthropicResponse = resp.json().await.map_err(|err| {
            AgentError::LanguageModel(format!("Anthropic response parse error: {err}"))
        })?;

        Ok(completion_from_blocks(parsed.content))
    }
}

fn system_prompt(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn tool_output_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn to_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut built = Vec::new();
    for message in messages {
        let (role, content) = match message.role {
            Role::System => continue,
            Role::User => ("user", vec![AnthropicContent::text(&message.content)]),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(AnthropicContent::text(&message.content));
                }
                match &message.tool_call {
                    Some(ToolCall {
                        id: Some(id),
                        name,
                        arguments,
                    }) => blocks.push(AnthropicContent::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: arguments.clone(),
                    }),
                    // tool_use blocks need an id; fall back to a textual record
                    Some(call) => blocks.push(AnthropicContent::text(format!(
                        "Calling tool `{}` with {}",
                        call.name, call.arguments
                    ))),
                    None => {}
                }
                if blocks.is_empty() {
                    continue;
                }
                ("assistant", blocks)
            }
            Role::Tool => {
                let block = match &message.tool_result {
                    Some(result) => match &result.tool_call_id {
                        Some(id) => AnthropicContent::ToolResult {
                            tool_use_id: id.clone(),
                            content: tool_output_text(&result.output),
                        },
                        None => AnthropicContent::text(format!(
                            "Tool `{}` returned {}",
                            result.name,
                            tool_output_text(&result.output)
                        )),
                    },
                    None => AnthropicContent::text(&message.content),
                };
                ("user", vec![block])
            }
        };
        built.push(AnthropicMessage { role, content });
    }
    built
}

fn to_tools(tools: &[ToolDescription]) -> Option<Vec<AnthropicTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object"})),
            })
            .collect(),
    )
}

fn completion_from_blocks(blocks: Vec<AnthropicContent>) -> ModelCompletion {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            AnthropicContent::Text { text } => content.push_str(&text),
            AnthropicContent::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id: Some(id),
                name,
                arguments: input,
            }),
            AnthropicContent::ToolResult { .. } | AnthropicContent::Unsupported => {}
        }
    }
    ModelCompletion::new(content, tool_calls)
}

/// Collects server-sent events into a completion. Lines may span chunks.
#[derive(Debug, Default)]
struct StreamAccumulator {
    buffer: Vec<u8>,
    content: String,
    tool_uses: BTreeMap<usize, PendingToolUse>,
}

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    input_json: String,
}

impl StreamAccumulator {
    fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line))?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<()> {
        let Some(data) = line.trim_end().strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Ok(());
        }

        let event: StreamEvent = serde_json::from_str(data).map_err(|err| {
            AgentError::LanguageModel(format!("Anthropic stream parse error `{data}`: {err}"))
        })?;
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                AnthropicContent::Text { text } => self.content.push_str(&text),
                AnthropicContent::ToolUse { id, name, .. } => {
                    self.tool_uses.insert(
                        index,
                        PendingToolUse {
                            id,
                            name,
                            input_json: String::new(),
                        },
                    );
                }
                AnthropicContent::ToolResult { .. } | AnthropicContent::Unsupported => {}
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                StreamDelta::TextDelta { text } => self.content.push_str(&text),
                StreamDelta::InputJsonDelta { partial_json } => {
                    if let Some(pending) = self.tool_uses.get_mut(&index) {
                        pending.input_json.push_str(&partial_json);
                    }
                }
                StreamDelta::Other => {}
            },
            StreamEvent::Error { error } => {
                return Err(AgentError::LanguageModel(format!(
                    "Anthropic stream error: {}",
                    error.message
                )));
            }
            StreamEvent::Other => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ModelCompletion> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&String::from_utf8_lossy(&rest))?;
        }

        let mut tool_calls = Vec::with_capacity(self.tool_uses.len());
        for pending in self.tool_uses.into_values() {
            let arguments = if pending.input_json.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&pending.input_json).map_err(|err| {
                    AgentError::LanguageModel(format!(
                        "Anthropic tool input for `{}` is not valid JSON: {err}",
                        pending.name
                    ))
                })?
            };
            tool_calls.push(ToolCall {
                id: Some(pending.id),
                name: pending.name,
                arguments,
            });
        }

        Ok(ModelCompletion::new(self.content, tool_calls))
    }
}

/// A deterministic model used for tests and demos.
///
/// Each scripted response is either a JSON directive
/// (`{"action":"respond",...}` / `{"action":"call_tool",...}`) or plain text.
pub struct StubModel {
    model: String,
    responses: Mutex<VecDeque<String>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Self::with_model_id("stub-model", responses)
    }

    pub fn with_model_id(model: impl Into<String>, responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            model: model.into(),
            responses: Mutex::new(responses.into()),
        })
    }
}

impl fmt::Debug for StubModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubModel")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond { content: String },
    CallTool { name: String, arguments: Value },
}

#[async_trait]
impl LanguageModel for StubModel {
    fn provider(&self) -> &str {
        "stub"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete_chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDescription],
        _stream: bool,
    ) -> Result<ModelCompletion> {
        let raw = self
            .responses
            .lock()
            .map_err(|_| AgentError::LanguageModel("StubModel lock poisoned".into()))?
            .pop_front()
            .ok_or_else(|| {
                AgentError::LanguageModel("StubModel ran out of scripted responses".into())
            })?;

        match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content }) => Ok(ModelCompletion {
                content: Some(content),
                tool_calls: Vec::new(),
            }),
            Ok(StubDirective::CallTool { name, arguments }) => Ok(ModelCompletion {
                content: None,
                tool_calls: vec![ToolCall {
                    id: None,
                    name,
                    arguments,
                }],
            }),
            Err(_) => Ok(ModelCompletion {
                content: Some(raw),
                tool_calls: Vec::new(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(other)]
    Unsupported,
}

impl AnthropicContent {
    fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockStart {
        index: usize,
        content_block: AnthropicContent,
    },
    ContentBlockDelta {
        index: usize,
        delta: StreamDelta,
    },
    Error {
        error: StreamErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
}
