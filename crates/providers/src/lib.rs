//! Generation client and transports for Filament.
//!
//! `ChatClient` implements the `filament_core::ChatModel` trait on top
//! of any `ChatTransport`; `OpenAiCompatTransport` is the HTTP
//! transport for OpenAI-compatible `/chat/completions` endpoints.

pub mod client;
pub mod openai;

pub use client::ChatClient;
pub use openai::{OpenAiCompatTransport, TransportConfig};
