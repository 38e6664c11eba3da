//! OpenAI-compatible HTTP transport.
//!
//! Works with any endpoint exposing the `/v1/chat/completions` wire
//! shape: OpenAI itself, OpenRouter, Ollama, vLLM, LocalAI, and
//! friends. The transport only moves requests and raw response chunks;
//! delta accumulation and tool dispatch live in the generation client.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use filament_core::chat::{
    ChatRequest, ChatResponse, ChatStreamChunk, ChatTransport, ChatChoice, Delta, DeltaChoice,
    FinishReason, ResponseFormat, TokenUsage, ToolCallDelta, ToolChoice,
};
use filament_core::error::{CacheError, ChatError};
use filament_core::thread::{Content, Message, Role, ToolCall};
use filament_core::Embedder;

/// Explicit transport configuration. Credentials are injected here at
/// construction, never read from the process environment.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Backend label used in logs and observation records.
    pub name: String,

    /// Base URL up to but excluding `/chat/completions`.
    pub base_url: String,

    /// Bearer token. Local endpoints accept any placeholder.
    pub api_key: String,

    /// Model used by the `Embedder` implementation.
    pub embedding_model: String,

    /// Whole-request timeout.
    pub timeout: std::time::Duration,
}

impl TransportConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            embedding_model: "text-embedding-3-small".into(),
            timeout: std::time::Duration::from_secs(120),
        }
    }

    /// Config for the hosted OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Config for a self-hosted OpenAI-compatible endpoint.
    pub fn local(base_url: impl Into<String>) -> Self {
        Self::new("local", base_url, "local")
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }
}

/// HTTP transport for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiCompatTransport {
    config: TransportConfig,
    client: reqwest::Client,
}

impl OpenAiCompatTransport {
    pub fn new(config: TransportConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Assemble the wire body. Unset optional parameters are absent
    /// from the payload so the provider's own defaults apply.
    fn build_body(request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_api_messages(&request.messages),
            "stream": stream,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }
        if let Some(format) = request.response_format {
            let kind = match format {
                ResponseFormat::Text => "text",
                ResponseFormat::JsonObject => "json_object",
            };
            body["response_format"] = serde_json::json!({ "type": kind });
        }
        if !request.tools.is_empty() {
            let tools: Vec<ApiToolDefinition> = request
                .tools
                .iter()
                .map(|t| ApiToolDefinition {
                    r#type: "function".into(),
                    function: ApiToolFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }
        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = match choice {
                ToolChoice::None => serde_json::json!("none"),
                ToolChoice::Auto => serde_json::json!("auto"),
                ToolChoice::Function(name) => serde_json::json!({
                    "type": "function",
                    "function": { "name": name },
                }),
            };
        }

        body
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept_sse: bool,
    ) -> Result<reqwest::Response, ChatError> {
        let mut builder = self
            .client
            .post(self.endpoint(path))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");
        if accept_sse {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200 => Ok(response),
            429 => Err(ChatError::RateLimited { retry_after_secs: 5 }),
            401 | 403 => Err(ChatError::AuthenticationFailed(
                "invalid API key or insufficient permissions".into(),
            )),
            _ => {
                let message = response.text().await.unwrap_or_default();
                warn!(status, body = %message, "backend returned error");
                Err(ChatError::Api {
                    status_code: status,
                    message,
                })
            }
        }
    }

    /// Embed a batch of texts via the `/embeddings` endpoint.
    pub async fn embeddings(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ChatError> {
        let body = serde_json::json!({
            "model": self.config.embedding_model,
            "input": inputs,
            "encoding_format": "float",
        });

        debug!(
            backend = %self.config.name,
            model = %self.config.embedding_model,
            count = inputs.len(),
            "sending embedding request"
        );

        let response = self.post("/embeddings", &body, false).await?;
        let api_response: EmbeddingApiResponse =
            response.json().await.map_err(|e| ChatError::Protocol(format!(
                "failed to parse embedding response: {e}"
            )))?;

        Ok(api_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl ChatTransport for OpenAiCompatTransport {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
        let body = Self::build_body(request, false);

        debug!(backend = %self.config.name, model = %request.model, "sending completion request");

        let response = self.post("/chat/completions", &body, false).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Protocol(format!("failed to parse response: {e}")))?;

        Ok(api_response.into())
    }

    async fn stream(
        &self,
        request: &ChatRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<ChatStreamChunk, ChatError>>,
        ChatError,
    > {
        let body = Self::build_body(request, true);

        debug!(backend = %self.config.name, model = %request.model, "sending streaming request");

        let response = self.post("/chat/completions", &body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and forward one parsed chunk per
        // `data:` line. The channel closing is the end-of-stream
        // signal; a send error means the receiver is gone.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ChatError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // Skip blank lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<SseChunk>(data) {
                        Ok(chunk) => {
                            if tx.send(Ok(chunk.into())).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            // A malformed delta aborts the stream.
                            let _ = tx
                                .send(Err(ChatError::Protocol(format!(
                                    "malformed stream chunk: {e}"
                                ))))
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl Embedder for OpenAiCompatTransport {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        let mut vectors = self
            .embeddings(&[text])
            .await
            .map_err(|e| CacheError::Embedding(e.to_string()))?;

        if vectors.is_empty() {
            return Err(CacheError::Embedding("no embedding returned".into()));
        }
        Ok(vectors.swap_remove(0))
    }
}

// --- Wire translation ---

/// Map thread messages onto the wire shape, folding each message's
/// content union exhaustively.
fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages.iter().map(to_api_message).collect()
}

fn to_api_message(message: &Message) -> ApiMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let mut parts: Vec<ApiContentPart> = Vec::new();
    let mut has_image = false;
    let mut tool_calls: Vec<ApiToolCall> = Vec::new();
    let mut tool_call_id: Option<String> = None;
    let mut tool_result: Option<String> = None;

    for content in &message.contents {
        match content {
            Content::Text { text } => parts.push(ApiContentPart::Text { text: text.clone() }),
            Content::Image { url } => {
                has_image = true;
                parts.push(ApiContentPart::ImageUrl {
                    image_url: ApiImageUrl { url: url.clone() },
                });
            }
            Content::ToolCalls { calls } => {
                tool_calls.extend(calls.iter().map(|call| ApiToolCall {
                    id: call.id.clone(),
                    r#type: "function".into(),
                    function: ApiFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                }));
            }
            Content::ToolResult {
                call_id, result, ..
            } => {
                tool_call_id = Some(call_id.clone());
                tool_result = Some(result.clone());
            }
        }
    }

    let content = if let Some(result) = tool_result {
        Some(ApiContent::Text(result))
    } else if parts.is_empty() {
        None
    } else if has_image {
        Some(ApiContent::Parts(parts))
    } else {
        let text: Vec<String> = parts
            .into_iter()
            .map(|p| match p {
                ApiContentPart::Text { text } => text,
                ApiContentPart::ImageUrl { .. } => String::new(),
            })
            .collect();
        Some(ApiContent::Text(text.join("\n")))
    };

    ApiMessage {
        role: role.into(),
        content,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        tool_call_id,
    }
}

fn finish_reason_from_wire(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

// --- Wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<ApiPromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiPromptTokensDetails {
    #[serde(default)]
    audio_tokens: u32,
    #[serde(default)]
    cached_tokens: u32,
}

impl From<ApiResponse> for ChatResponse {
    fn from(api: ApiResponse) -> Self {
        let usage = api.usage.map(|u| {
            let details = u.prompt_tokens_details.unwrap_or(ApiPromptTokensDetails {
                audio_tokens: 0,
                cached_tokens: 0,
            });
            TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                audio_tokens: details.audio_tokens,
                cached_tokens: details.cached_tokens,
            }
        });

        let choices = api
            .choices
            .into_iter()
            .map(|c| ChatChoice {
                finish_reason: c.finish_reason.as_deref().map(finish_reason_from_wire),
                content: c.message.content.unwrap_or_default(),
                tool_calls: c
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    })
                    .collect(),
            })
            .collect();

        ChatResponse {
            model: api.model,
            choices,
            usage,
        }
    }
}

// --- Streaming SSE wire types ---

#[derive(Debug, Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<SseToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<SseFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct SseFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl From<SseChunk> for ChatStreamChunk {
    fn from(chunk: SseChunk) -> Self {
        ChatStreamChunk {
            choices: chunk
                .choices
                .into_iter()
                .map(|c| DeltaChoice {
                    finish_reason: c.finish_reason.as_deref().map(finish_reason_from_wire),
                    delta: Delta {
                        content: c.delta.content,
                        tool_calls: c
                            .delta
                            .tool_calls
                            .unwrap_or_default()
                            .into_iter()
                            .map(|tc| {
                                let function = tc.function.unwrap_or(SseFunctionDelta {
                                    name: None,
                                    arguments: None,
                                });
                                ToolCallDelta {
                                    id: tc.id,
                                    name: function.name,
                                    arguments: function.arguments,
                                }
                            })
                            .collect(),
                    },
                })
                .collect(),
        }
    }
}

// --- Embedding wire types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
