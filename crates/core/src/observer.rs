//! Observation hooks around generation calls.
//!
//! A purely side-channel instrumentation boundary: the client opens a
//! `GenerationRecord` before the provider call and finalizes it with
//! the produced messages afterwards. Hooks never influence control
//! flow beyond their own errors; an absent observer is a legal no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ObserverError;
use crate::thread::Message;

/// One observed generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Unique id for this record.
    pub id: String,

    /// Trace this generation belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// Parent span within the trace, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Label, conventionally `llm-{client name}`.
    pub name: String,

    /// The model the call was issued against.
    pub model: String,

    /// Sampling parameters as a JSON map.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub model_parameters: serde_json::Map<String, serde_json::Value>,

    /// Thread snapshot at call start.
    pub input: Vec<Message>,

    /// Messages appended by the call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<Message>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl GenerationRecord {
    /// Open a new record at call start.
    pub fn start(
        name: impl Into<String>,
        model: impl Into<String>,
        model_parameters: serde_json::Map<String, serde_json::Value>,
        input: Vec<Message>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trace_id: None,
            parent_id: None,
            name: name.into(),
            model: model.into(),
            model_parameters,
            input,
            output: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Finalize the record with the messages the call produced.
    pub fn finish(mut self, output: Vec<Message>) -> Self {
        self.output = output;
        self.ended_at = Some(Utc::now());
        self
    }
}

/// Before/after instrumentation around each generation call.
///
/// Both hooks may rewrite the record (e.g. to attach backend-assigned
/// ids); the client threads the returned record through.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn on_generation(
        &self,
        record: GenerationRecord,
    ) -> std::result::Result<GenerationRecord, ObserverError>;

    async fn on_generation_end(
        &self,
        record: GenerationRecord,
    ) -> std::result::Result<GenerationRecord, ObserverError>;
}

/// An observer that records nothing.
pub struct NoopObserver;

#[async_trait]
impl Observer for NoopObserver {
    async fn on_generation(
        &self,
        record: GenerationRecord,
    ) -> std::result::Result<GenerationRecord, ObserverError> {
        Ok(record)
    }

    async fn on_generation_end(
        &self,
        record: GenerationRecord,
    ) -> std::result::Result<GenerationRecord, ObserverError> {
        Ok(record)
    }
}
