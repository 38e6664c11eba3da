//! Tool trait, registry, and dispatch.
//!
//! Tools are externally registered functions the model may elect to
//! call. The registry is read-only during a generation call; dispatch
//! walks the call list in input order and turns every call, including
//! failed ones, into exactly one tool-role message, so the
//! conversation can continue and the model can react to failures.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chat::ToolDefinition;
use crate::error::ToolError;
use crate::thread::{Message, ToolCall};

/// An externally registered function the model may call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique tool name (e.g. "calculator", "web_search").
    fn name(&self) -> &str;

    /// What this tool does, sent to the model verbatim.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute with already-decoded JSON arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// The schema attached to provider requests.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Decode a JSON argument value into a tool's typed input shape.
///
/// A mismatch is a typed `InvalidArguments` error, never a silent
/// best-effort coercion.
pub fn decode_arguments<T: DeserializeOwned>(
    arguments: serde_json::Value,
) -> std::result::Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// The mapping from tool name to callable.
///
/// Owned by the generation client it was configured into; lookup-only
/// while a call is in flight.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// All registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// All tool schemas, for attaching to a provider request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute one call: look up the tool, decode its JSON argument
    /// payload, invoke it, and encode the return value back to a JSON
    /// string.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<String, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let arguments: serde_json::Value = serde_json::from_str(&call.arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let value = tool.execute(arguments).await?;

        serde_json::to_string(&value).map_err(|e| ToolError::ExecutionFailed {
            tool_name: call.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Dispatch a tool-call set in input order.
    ///
    /// No-op (empty result) when the registry or the call list is
    /// empty. Every dispatched call yields exactly one tool-role
    /// message referencing its originating call id; failures are
    /// embedded as the result content rather than surfaced as errors.
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Vec<Message> {
        if self.tools.is_empty() || calls.is_empty() {
            return Vec::new();
        }

        let mut messages = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self.execute(call).await {
                Ok(result) => {
                    debug!(tool = %call.name, call_id = %call.id, "tool call succeeded");
                    result
                }
                Err(e) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                    format!("error: {e}")
                }
            };
            messages.push(Message::tool_result(&call.id, &call.name, result));
        }
        messages
    }
}
