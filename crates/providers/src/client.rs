//! The generation client: one conversation round trip.
//!
//! `ChatClient` turns a thread into a provider request, interprets the
//! reply (plain text, streamed deltas, or a tool-call set), dispatches
//! requested tools, and appends everything back onto the thread in one
//! batch. A configured semantic cache can short-circuit the whole trip;
//! observation hooks bracket every live call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use filament_core::cache::{CacheOutcome, SemanticCache};
use filament_core::chat::{
    ChatModel, ChatRequest, ChatTransport, FinishReason, ResponseFormat, StreamEvent, StreamSink,
    TokenUsage, ToolChoice,
};
use filament_core::error::{ChatError, Error, Result};
use filament_core::observer::{GenerationRecord, Observer};
use filament_core::thread::{Message, Role, Thread, ToolCall};
use filament_core::tool::{Tool, ToolRegistry};

/// Outcome of the pre-flight cache probe.
enum CacheProbe {
    /// No cache configured.
    Disabled,
    /// Answer served from the cache; the provider is not called.
    Hit,
    /// Definitive miss; carry the query embedding to the later write.
    Miss(Vec<f32>),
}

/// A configured connection to one chat model.
///
/// Construction is explicit: transport and model in, everything else
/// through `with_*` builders. The client owns its tool registry; tools
/// are not shared mutable state across concurrent calls.
pub struct ChatClient {
    transport: Arc<dyn ChatTransport>,
    name: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    stop: Vec<String>,
    response_format: Option<ResponseFormat>,
    tools: ToolRegistry,
    tool_choice: Option<ToolChoice>,
    stream_sink: Option<Arc<StreamSink>>,
    cache: Option<Arc<dyn SemanticCache>>,
    observer: Option<Arc<dyn Observer>>,
    trace_id: Option<String>,
    parent_id: Option<String>,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn ChatTransport>, model: impl Into<String>) -> Self {
        let name = transport.name().to_string();
        Self {
            transport,
            name,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            stop: Vec::new(),
            response_format: None,
            tools: ToolRegistry::new(),
            tool_choice: None,
            stream_sink: None,
            cache: None,
            observer: None,
            trace_id: None,
            parent_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Register one tool.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    /// Replace the whole tool registry.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Let the model decide (`Auto`) or pin a single tool
    /// (`Function(name)`). Unset means tools may be advertised but the
    /// model is told not to call them.
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    /// Switch the client to streaming mode. Each text delta is handed
    /// to `sink` as it arrives, followed by a final `Done` event.
    pub fn with_stream(mut self, sink: impl Fn(StreamEvent) + Send + Sync + 'static) -> Self {
        self.stream_sink = Some(Arc::new(sink));
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SemanticCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach trace correlation ids carried into observation records.
    pub fn with_trace(mut self, trace_id: impl Into<String>, parent_id: Option<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.parent_id = parent_id;
        self
    }

    /// Collect the non-empty thread messages and the configured
    /// parameters into a provider request. Tools are attached only when
    /// the registry is non-empty, and then a tool-choice directive is
    /// always derived alongside them.
    fn build_request(&self, thread: &Thread) -> ChatRequest {
        let messages: Vec<Message> = thread
            .messages()
            .iter()
            .filter(|m| !m.contents.is_empty())
            .cloned()
            .collect();

        let mut request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: self.stop.clone(),
            response_format: self.response_format,
            tools: Vec::new(),
            tool_choice: None,
        };

        if !self.tools.is_empty() {
            request.tools = self.tools.definitions();
            request.tool_choice =
                Some(self.tool_choice.clone().unwrap_or(ToolChoice::None));
        }

        request
    }

    async fn probe_cache(&self, thread: &mut Thread) -> Result<CacheProbe> {
        let Some(cache) = &self.cache else {
            return Ok(CacheProbe::Disabled);
        };

        let query = thread.user_query();
        match cache.get(&query).await? {
            CacheOutcome::Hit { answer, .. } => {
                debug!(client = %self.name, "cache hit, skipping provider call");
                thread.add_message(Message::assistant(answer));
                Ok(CacheProbe::Hit)
            }
            CacheOutcome::Miss { embedding } => Ok(CacheProbe::Miss(embedding)),
        }
    }

    /// Persist the answer just produced, keyed by the probe embedding.
    /// Skipped silently when the final assistant message carries any
    /// non-text content; tool-bearing answers are never cached.
    async fn write_cache(&self, thread: &Thread, embedding: &[f32]) -> Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let Some(last) = thread.last_message() else {
            return Ok(());
        };
        if last.role != Role::Assistant || last.contents.is_empty() || !last.is_text_only() {
            return Ok(());
        }

        cache.set(embedding, &last.text()).await?;
        Ok(())
    }

    async fn observe_start(&self, thread: &Thread) -> Result<Option<GenerationRecord>> {
        let Some(observer) = &self.observer else {
            return Ok(None);
        };

        let mut parameters = serde_json::Map::new();
        if let Some(temperature) = self.temperature {
            parameters.insert("temperature".into(), serde_json::json!(temperature));
        }
        if let Some(max_tokens) = self.max_tokens {
            parameters.insert("max_tokens".into(), serde_json::json!(max_tokens));
        }

        let mut record = GenerationRecord::start(
            format!("llm-{}", self.name),
            &self.model,
            parameters,
            thread.messages().to_vec(),
        );
        record.trace_id = self.trace_id.clone();
        record.parent_id = self.parent_id.clone();

        Ok(Some(observer.on_generation(record).await?))
    }

    async fn observe_end(
        &self,
        record: Option<GenerationRecord>,
        output: &[Message],
    ) -> Result<()> {
        let Some(observer) = &self.observer else {
            return Ok(());
        };
        let Some(record) = record else {
            return Ok(());
        };

        observer
            .on_generation_end(record.finish(output.to_vec()))
            .await?;
        Ok(())
    }

    /// One full round trip: cache probe, provider call (streamed or
    /// not), tool dispatch, thread append, cache write.
    async fn run(&self, thread: &mut Thread) -> Result<TokenUsage> {
        let probe = self.probe_cache(thread).await?;
        let miss_embedding = match probe {
            CacheProbe::Hit => return Ok(TokenUsage::default()),
            CacheProbe::Miss(embedding) => Some(embedding),
            CacheProbe::Disabled => None,
        };

        let request = self.build_request(thread);
        let record = self.observe_start(thread).await?;
        let n_before = thread.len();

        info!(
            client = %self.name,
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            streaming = self.stream_sink.is_some(),
            "generation call"
        );

        let usage = if let Some(sink) = self.stream_sink.clone() {
            self.stream_round_trip(thread, &request, &sink).await?;
            // True counts are unavailable from a stream.
            TokenUsage::default()
        } else {
            self.complete_round_trip(thread, &request).await?
        };

        self.observe_end(record, &thread.messages()[n_before..])
            .await?;

        if let Some(embedding) = miss_embedding {
            self.write_cache(thread, &embedding).await?;
        }

        Ok(usage)
    }

    async fn complete_round_trip(
        &self,
        thread: &mut Thread,
        request: &ChatRequest,
    ) -> Result<TokenUsage> {
        let response = self.transport.complete(request).await.map_err(Error::Chat)?;
        let usage = response.usage.unwrap_or_default();

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(ChatError::Protocol("no choices returned".into()).into());
        };

        let mut messages = Vec::new();
        let wants_tools = choice.finish_reason == Some(FinishReason::ToolCalls)
            || !choice.tool_calls.is_empty();

        if wants_tools {
            messages.push(Message::tool_calls(choice.tool_calls.clone()));
            messages.extend(self.tools.dispatch(&choice.tool_calls).await);
        } else {
            messages.push(Message::assistant(choice.content));
        }

        // One batch append: partial messages are never visible.
        thread.add_messages(messages);
        Ok(usage)
    }

    async fn stream_round_trip(
        &self,
        thread: &mut Thread,
        request: &ChatRequest,
        sink: &Arc<StreamSink>,
    ) -> Result<()> {
        let mut chunks = self.transport.stream(request).await.map_err(Error::Chat)?;

        let mut content = String::new();
        let mut open: Option<ToolCall> = None;
        let mut completed: Vec<ToolCall> = Vec::new();

        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk.map_err(Error::Chat)?;
            let Some(choice) = chunk.choices.first() else {
                return Err(
                    ChatError::Protocol("no choices returned in stream chunk".into()).into(),
                );
            };

            let is_tool_delta = choice.finish_reason == Some(FinishReason::ToolCalls)
                || !choice.delta.tool_calls.is_empty();

            if is_tool_delta {
                if let Some(delta) = choice.delta.tool_calls.first() {
                    match delta.id.as_deref().filter(|id| !id.is_empty()) {
                        // A fresh id starts a new record, committing
                        // the one in progress first.
                        Some(id) => {
                            if let Some(done) = open.take() {
                                completed.push(done);
                            }
                            open = Some(ToolCall {
                                id: id.to_string(),
                                name: delta.name.clone().unwrap_or_default(),
                                arguments: delta.arguments.clone().unwrap_or_default(),
                            });
                        }
                        // No id: an argument continuation for the
                        // currently open record.
                        None => {
                            if let (Some(call), Some(fragment)) =
                                (open.as_mut(), delta.arguments.as_deref())
                            {
                                call.arguments.push_str(fragment);
                            }
                        }
                    }
                }
            } else if let Some(text) = choice.delta.content.as_deref() {
                content.push_str(text);
                sink(StreamEvent::Delta {
                    content: text.to_string(),
                });
            }
        }

        sink(StreamEvent::Done);

        if let Some(done) = open.take() {
            completed.push(done);
        }

        let mut messages = Vec::new();
        if !completed.is_empty() {
            // Tool calls win: accumulated text is not committed
            // alongside a tool-call record.
            messages.push(Message::tool_calls(completed.clone()));
            messages.extend(self.tools.dispatch(&completed).await);
        } else if !content.is_empty() {
            messages.push(Message::assistant(content));
        }

        thread.add_messages(messages);
        Ok(())
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn generate(&self, thread: &mut Thread) -> Result<()> {
        self.run(thread).await.map(|_| ())
    }

    async fn generate_with_usage(&self, thread: &mut Thread) -> Result<TokenUsage> {
        self.run(thread).await
    }
}
