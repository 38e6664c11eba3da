//! Error types for the Filament domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum, folded into the
//! top-level `Error` via `#[from]`.

use thiserror::Error;

/// The top-level error type for all Filament operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Observer error: {0}")]
    Observer(#[from] ObserverError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to a chat-completion backend.
///
/// `Protocol` covers responses the backend must never produce
/// (zero choices, malformed stream deltas). Those are fatal for the
/// current call and never retried.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Errors raised during tool lookup, argument decoding, or execution.
///
/// During dispatch these are recovered into the tool-result content so
/// the model can see the failure and react; they only surface as `Err`
/// from direct registry calls.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

/// Errors from the semantic cache.
///
/// A cache miss is not an error; it is `CacheOutcome::Miss`. Anything
/// here aborts the generation call before the provider is contacted.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from an observation hook.
#[derive(Debug, Clone, Error)]
pub enum ObserverError {
    #[error("observer sink failed: {0}")]
    Sink(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_error_displays_correctly() {
        let err = Error::Chat(ChatError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::ExecutionFailed {
            tool_name: "calculator".into(),
            reason: "division by zero".into(),
        });
        assert!(err.to_string().contains("calculator"));
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn protocol_error_display() {
        let err = ChatError::Protocol("no choices returned".into());
        assert!(err.to_string().contains("no choices returned"));
    }
}
