//! # Filament Core
//!
//! Domain types, traits, and error definitions for the Filament
//! generation engine. This crate defines the seams every other crate
//! implements against: the conversation thread, the tool registry, the
//! provider boundary, and the cache and observer hooks.
//!
//! Implementations live in their own crates and depend inward on core,
//! which keeps the dependency graph clean and makes every boundary
//! trivially fakeable in tests.

pub mod cache;
pub mod chat;
pub mod error;
pub mod observer;
pub mod thread;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use cache::{CacheOutcome, Embedder, SemanticCache};
pub use chat::{
    ChatChoice, ChatModel, ChatRequest, ChatResponse, ChatStreamChunk, ChatTransport, Delta,
    DeltaChoice, FinishReason, ResponseFormat, StreamEvent, StreamSink, TokenUsage, ToolCallDelta,
    ToolChoice, ToolDefinition,
};
pub use error::{CacheError, ChatError, Error, ObserverError, Result, ToolError};
pub use observer::{GenerationRecord, NoopObserver, Observer};
pub use thread::{Content, Message, Role, Thread, ToolCall};
pub use tool::{decode_arguments, Tool, ToolRegistry};
