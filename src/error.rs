//! Error types for murmur

use thiserror::Error;

/// Result type alias for murmur operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in murmur
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Inference server did not answer the liveness probe
    #[error("inference server unreachable at {url}: {reason}")]
    ServerUnreachable { url: String, reason: String },

    /// Model listing or pull failed
    #[error("model error: {0}")]
    ModelPull(String),

    /// Synthesis executable could not be resolved or run
    #[error("speech synthesizer not available: {0}")]
    SynthesizerMissing(String),

    /// Voice model files are absent
    #[error("voice model missing: {0}")]
    VoiceMissing(String),

    /// Chat request failed; the turn may be retried
    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error ends the process when raised during bootstrap
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::ServerUnreachable { .. }
                | Self::ModelPull(_)
                | Self::SynthesizerMissing(_)
                | Self::VoiceMissing(_)
        )
    }

    /// Remediation hint shown alongside a fatal error
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ServerUnreachable { .. } => Some(
                "start the inference server with `ollama serve` (install from https://ollama.com/download), or pass --start-server",
            ),
            Self::ModelPull(_) => Some(
                "check the model name with `ollama list` or pull it manually with `ollama pull <model>`",
            ),
            Self::SynthesizerMissing(_) => {
                Some("install Piper with `pip install piper-tts` or pass --piper <path>")
            }
            Self::VoiceMissing(_) => Some(
                "place the .onnx and .onnx.json voice files in the voices directory, or pass --download-voices",
            ),
            _ => None,
        }
    }
}
