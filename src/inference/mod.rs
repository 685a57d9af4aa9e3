//! Inference server client
//!
//! Talks to a local Ollama server: liveness and model listing via
//! `/api/tags`, one-time model download via `/api/pull`, replies via
//! `/api/chat`.

mod client;
mod pull;

use async_trait::async_trait;

use crate::Result;
use crate::conversation::Turn;

pub use client::{
    DEFAULT_CHAT_TIMEOUT, DEFAULT_PULL_IDLE_TIMEOUT, OllamaClient, resolve_model_name,
};
pub use pull::{PullProgress, PullReporter, split_ndjson_lines};

/// Produces assistant replies from the dialogue so far
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate the next assistant message for `history`
    ///
    /// `history` holds every turn in chronological order, ending with the
    /// user message being answered.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InferenceUnavailable`] on network failure or
    /// an unusable response
    async fn chat(&self, model: &str, history: &[Turn]) -> Result<String>;
}
