//! HTTP client for the Ollama API

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::ChatBackend;
use super::pull::{PullProgress, split_ndjson_lines};
use crate::conversation::Turn;
use crate::{Error, Result};

/// Default bound on a chat completion
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(120);

/// Bound on the liveness probe and model listing
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest a pull may go without receiving progress
pub const DEFAULT_PULL_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Bound on establishing any connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

/// Pick the installed name matching `requested`
///
/// An untagged request also matches its `:latest` tag.
#[must_use]
pub fn resolve_model_name(requested: &str, available: &[String]) -> Option<String> {
    if available.iter().any(|m| m == requested) {
        return Some(requested.to_string());
    }

    if requested.contains(':') {
        return None;
    }

    let latest = format!("{requested}:latest");
    available.iter().any(|m| *m == latest).then_some(latest)
}

/// Ollama API client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    chat_timeout: Duration,
    pull_idle_timeout: Duration,
}

impl OllamaClient {
    /// Create a client for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not a valid http(s) URL, or
    /// [`Error::Http`] if the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid inference URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "inference URL must be http or https: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
            pull_idle_timeout: DEFAULT_PULL_IDLE_TIMEOUT,
        })
    }

    /// Override the chat completion timeout
    #[must_use]
    pub const fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    /// Override how long a pull may stall between progress updates
    #[must_use]
    pub const fn with_pull_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pull_idle_timeout = timeout;
        self
    }

    /// Base URL without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Underlying HTTP client, shared for other downloads
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn unreachable(&self, reason: impl Into<String>) -> Error {
        Error::ServerUnreachable {
            url: self.base_url.clone(),
            reason: reason.into(),
        }
    }

    /// List installed models; doubles as the liveness probe
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServerUnreachable`] if the server does not answer
    /// with a model list
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint("api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unreachable(format!("status {}", response.status())));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| self.unreachable(format!("unexpected /api/tags response: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the server currently answers the liveness probe
    pub async fn is_running(&self) -> bool {
        self.list_models().await.is_ok()
    }

    /// Download `model`, blocking until the progress stream ends
    ///
    /// There is no bound on the total duration; only a stream that goes
    /// quiet for longer than the idle timeout is abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelPull`] if the request fails, the stream stalls,
    /// or the stream reports an error
    pub async fn pull_model<F>(&self, model: &str, mut on_progress: F) -> Result<()>
    where
        F: FnMut(&PullProgress) -> std::io::Result<()>,
    {
        tracing::info!(model, "pulling model");

        let idle = self.pull_idle_timeout;
        let stalled = || Error::ModelPull(format!("no progress for {}s", idle.as_secs_f32()));

        let request = self.client.post(self.endpoint("api/pull")).json(&PullRequest {
            name: model,
            stream: true,
        });
        let response = tokio::time::timeout(idle, request.send())
            .await
            .map_err(|_| stalled())?
            .map_err(|e| Error::ModelPull(format!("pull request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ModelPull(format!(
                "pull of '{model}' failed ({status}): {}",
                body.trim()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buf = Vec::new();
        while let Some(chunk) = tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| stalled())?
        {
            let chunk = chunk.map_err(|e| Error::ModelPull(format!("pull stream failed: {e}")))?;
            buf.extend_from_slice(&chunk);
            for line in split_ndjson_lines(&mut buf) {
                Self::handle_pull_line(model, &line, &mut on_progress)?;
            }
        }
        if !buf.iter().all(u8::is_ascii_whitespace) {
            Self::handle_pull_line(model, &buf, &mut on_progress)?;
        }

        tracing::info!(model, "model pull complete");
        Ok(())
    }

    fn handle_pull_line<F>(model: &str, line: &[u8], on_progress: &mut F) -> Result<()>
    where
        F: FnMut(&PullProgress) -> std::io::Result<()>,
    {
        let progress: PullProgress = match serde_json::from_slice(line) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable pull progress line");
                return Ok(());
            }
        };

        if let Some(error) = &progress.error {
            return Err(Error::ModelPull(format!("pull of '{model}' failed: {error}")));
        }

        on_progress(&progress)?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, model: &str, history: &[Turn]) -> Result<String> {
        tracing::debug!(model, turns = history.len(), "sending chat request");

        let response = self
            .client
            .post(self.endpoint("api/chat"))
            .timeout(self.chat_timeout)
            .json(&ChatRequest {
                model,
                messages: history,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::InferenceUnavailable(
                        "request timed out; the model may be loading or busy".to_string(),
                    )
                } else {
                    Error::InferenceUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::InferenceUnavailable(e.to_string()))?;

        let parsed: Option<ChatResponse> = serde_json::from_str(&body).ok();

        if let Some(error) = parsed.as_ref().and_then(|r| r.error.as_deref()) {
            return Err(Error::InferenceUnavailable(format!("server error: {error}")));
        }

        if !status.is_success() {
            return Err(Error::InferenceUnavailable(format!(
                "server returned {status}: {}",
                body.trim()
            )));
        }

        parsed
            .and_then(|r| r.message)
            .map(|m| m.content)
            .ok_or_else(|| {
                Error::InferenceUnavailable(format!("unexpected response format: {}", body.trim()))
            })
    }
}
