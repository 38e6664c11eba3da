//! The provider boundary: request/response types, the wire-level
//! `ChatTransport` trait, and the `ChatModel` trait the agent loop
//! programs against.
//!
//! A transport only moves a request across the wire and hands back
//! choices or raw stream chunks; all interpretation (tool-call
//! detection, delta accumulation, thread translation) belongs to the
//! generation client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::thread::{Message, Thread, ToolCall};

/// A tool definition sent to the model so it knows what it can call.
/// `parameters` is a JSON Schema object, used verbatim on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How the model is allowed to use the attached tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model must not call tools.
    None,
    /// The model decides.
    Auto,
    /// The model must call this one tool.
    Function(String),
}

/// Output format constraint for the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// A fully assembled provider request.
///
/// Optional numeric parameters are `Option` on purpose: an unset value
/// is omitted from the wire so the provider's own default applies,
/// never silently sent as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,

    /// The non-empty thread messages, in conversation order.
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

/// One completion alternative from a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// The message text, empty when the choice carries tool calls.
    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// Token usage counters extracted from provider response metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub audio_tokens: u32,
    pub cached_tokens: u32,
}

/// A complete (non-streamed) provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,

    pub choices: Vec<ChatChoice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// An incremental fragment of one streamed tool call.
///
/// A fragment with a non-empty `id` introduces a new call; a fragment
/// without one continues the arguments of the currently open call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// The delta payload of one stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// One choice inside a stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    #[serde(default)]
    pub delta: Delta,
}

/// One raw chunk of a streamed response, before any accumulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    pub choices: Vec<DeltaChoice>,
}

/// Events delivered to a caller-supplied incremental-output sink:
/// one `Delta` per streamed text fragment, then exactly one `Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Delta { content: String },
    Done,
}

/// The incremental-output sink. Invoked synchronously per chunk, in
/// order, before the next chunk is consumed. It must not block
/// indefinitely since it gates the stream.
pub type StreamSink = dyn Fn(StreamEvent) + Send + Sync;

/// The wire boundary to a chat-completion backend.
///
/// Implementations: OpenAI-compatible HTTP endpoints, local servers,
/// scripted fakes in tests. Streamed chunks arrive over an mpsc
/// receiver which closes at clean end-of-stream.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// A human-readable backend name (e.g. "openai", "local").
    fn name(&self) -> &str;

    /// Issue one request, return the complete response.
    async fn complete(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ChatResponse, ChatError>;

    /// Issue one request in streaming mode.
    async fn stream(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChatStreamChunk, ChatError>>,
        ChatError,
    >;
}

/// The generation interface the agent loop depends on.
///
/// A `ChatModel` owns its configuration (model name, sampling
/// parameters, tools, cache, hooks) and mutates the thread it is given:
/// every call appends the assistant reply and, when tools were invoked,
/// the tool-call record plus one result message per call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one generation round trip against the thread.
    async fn generate(&self, thread: &mut Thread) -> Result<()>;

    /// Same as [`generate`](ChatModel::generate) but additionally
    /// returns token-usage counters. When the model is configured for
    /// streaming the counters are all zero; usage is not available
    /// from a stream.
    async fn generate_with_usage(&self, thread: &mut Thread) -> Result<TokenUsage>;
}
