//! # Filament Agent
//!
//! The iterative generation loop. Each iteration runs one generation
//! call against the thread; when the call resolved tool calls the loop
//! goes around again so the model can react to the results, and when it
//! produced a plain answer the loop is done. A hard iteration cap keeps
//! a tool-happy model from spinning forever.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use filament_core::chat::ChatModel;
use filament_core::error::Result;
use filament_core::thread::{Message, Thread};

const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Where the loop ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// At least one iteration remains and the last one invoked tools.
    Running,
    /// The model produced a final answer without requesting tools.
    Done,
    /// The iteration cap was hit while the model still wanted tools.
    Exhausted,
}

/// Drives a [`ChatModel`] to a final answer over a thread.
///
/// The agent holds no tool or provider configuration of its own; all of
/// that lives in the model it is given. It only decides whether to go
/// around again.
pub struct Agent {
    model: Arc<dyn ChatModel>,
    max_iterations: u32,
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Cap the number of generation calls per [`run`](Agent::run).
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run the loop until the model answers in plain text or the
    /// iteration cap is reached. Exactly one generation call happens
    /// per iteration; the thread keeps everything each call appended.
    pub async fn run(&self, thread: &mut Thread) -> Result<AgentState> {
        for iteration in 1..=self.max_iterations {
            debug!(iteration, max = self.max_iterations, "agent iteration");

            let n_before = thread.len();
            self.model.generate(thread).await?;

            let appended = &thread.messages()[n_before..];
            let invoked_tools = appended.iter().any(Message::has_tool_calls);

            if !invoked_tools {
                info!(iteration, "agent finished with a text answer");
                return Ok(AgentState::Done);
            }
        }

        warn!(
            max = self.max_iterations,
            "iteration cap reached while the model still wanted tools"
        );
        Ok(AgentState::Exhausted)
    }
}
