//! Configuration management for murmur
//!
//! Precedence, lowest first: built-in defaults, the TOML config file,
//! environment variables, command-line flags. The last two arrive together
//! as [`Overrides`] because clap reads both.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::inference::DEFAULT_CHAT_TIMEOUT;
use crate::voice::{DEFAULT_VOICE_BASE_URL, VoiceSelection};
use crate::{Error, Result};

pub use file::{MurmurConfigFile, config_file_path, load_config_file};

/// Default inference server
pub const DEFAULT_URL: &str = "http://localhost:11434";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Default voices directory, relative to the working directory
pub const DEFAULT_VOICES_DIR: &str = "voices";

/// Default synthesis timeout
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<VoiceSelection>,
    pub voices_dir: Option<PathBuf>,
    pub piper: Option<PathBuf>,
    pub start_server: bool,
    pub download_voices: bool,
    pub no_speech: bool,
}

/// Immutable runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Inference server base URL
    pub url: String,

    /// Model identifier to request
    pub model: String,

    /// Voice active at startup
    pub voice: VoiceSelection,

    /// Directory holding voice model files
    pub voices_dir: PathBuf,

    /// Explicit Piper executable, searched for when `None`
    pub piper: Option<PathBuf>,

    /// Spawn `ollama serve` if the server is down
    pub start_server: bool,

    /// Download missing voice files at startup
    pub download_voices: bool,

    /// Base URL voice files are downloaded from
    pub voice_download_url: String,

    /// Speak replies; text-only when false
    pub speech_enabled: bool,

    /// Bound on a chat completion
    pub chat_timeout: Duration,

    /// Bound on one synthesis run
    pub synthesis_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: VoiceSelection::default(),
            voices_dir: PathBuf::from(DEFAULT_VOICES_DIR),
            piper: None,
            start_server: false,
            download_voices: false,
            voice_download_url: DEFAULT_VOICE_BASE_URL.to_string(),
            speech_enabled: true,
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
        }
    }
}

impl Config {
    /// Load the config file (from `config_path` or the standard location)
    /// and apply `overrides` on top
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load(overrides: Overrides, config_path: Option<&Path>) -> Result<Self> {
        let file = load_config_file(config_path);
        Self::resolve(overrides, file)
    }

    /// Merge defaults, file values and overrides
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid URL, empty model name, or a
    /// zero timeout
    pub fn resolve(overrides: Overrides, file: MurmurConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let server = file.server;
        let voice = file.voice;

        let config = Self {
            url: overrides.url.or(server.url).unwrap_or(defaults.url),
            model: overrides.model.or(server.model).unwrap_or(defaults.model),
            voice: overrides.voice.or(voice.quality).unwrap_or(defaults.voice),
            voices_dir: overrides
                .voices_dir
                .or(voice.voices_dir)
                .unwrap_or(defaults.voices_dir),
            piper: overrides.piper.or(voice.piper),
            start_server: overrides.start_server || server.start_server.unwrap_or(false),
            download_voices: overrides.download_voices || voice.download.unwrap_or(false),
            voice_download_url: voice.download_url.unwrap_or(defaults.voice_download_url),
            speech_enabled: !overrides.no_speech && voice.enabled.unwrap_or(true),
            chat_timeout: server
                .chat_timeout_secs
                .map_or(defaults.chat_timeout, Duration::from_secs),
            synthesis_timeout: voice
                .synthesis_timeout_secs
                .map_or(defaults.synthesis_timeout, Duration::from_secs),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        require_http_url("inference", &self.url)?;
        require_http_url("voice download", &self.voice_download_url)?;

        if self.model.trim().is_empty() {
            return Err(Error::Config("model identifier must not be empty".to_string()));
        }

        if self.chat_timeout.is_zero() || self.synthesis_timeout.is_zero() {
            return Err(Error::Config("timeouts must be greater than zero".to_string()));
        }

        Ok(())
    }
}

fn require_http_url(what: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value)
        .map_err(|e| Error::Config(format!("invalid {what} URL '{value}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!("{what} URL must be http or https: {value}")));
    }
    Ok(())
}
