//! TOML configuration file loading
//!
//! Supports `~/.config/murmur/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::voice::VoiceSelection;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MurmurConfigFile {
    /// Inference server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Speech output configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Inference server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Base URL (e.g. "http://localhost:11434")
    pub url: Option<String>,

    /// Model identifier (e.g. "llama3.2")
    pub model: Option<String>,

    /// Chat completion timeout in seconds
    pub chat_timeout_secs: Option<u64>,

    /// Spawn `ollama serve` when the server is not running
    pub start_server: Option<bool>,
}

/// Speech output configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Initial voice quality
    pub quality: Option<VoiceSelection>,

    /// Directory holding `.onnx` voice files
    pub voices_dir: Option<PathBuf>,

    /// Path to the Piper executable
    pub piper: Option<PathBuf>,

    /// Synthesis timeout in seconds
    pub synthesis_timeout_secs: Option<u64>,

    /// Fetch missing voice files at startup
    pub download: Option<bool>,

    /// Base URL voice files are fetched from
    pub download_url: Option<String>,

    /// Speak replies (false for text-only mode)
    pub enabled: Option<bool>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `MurmurConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> MurmurConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return MurmurConfigFile::default();
    };

    if !path.exists() {
        return MurmurConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                MurmurConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MurmurConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/murmur/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("murmur").join("config.toml"))
}
