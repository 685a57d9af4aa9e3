//! Speech output module
//!
//! Synthesizes replies with the Piper CLI and plays the resulting WAV
//! through a native audio player.

mod download;
mod playback;
mod tts;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use download::{DEFAULT_VOICE_BASE_URL, VoiceSource, download_missing};
pub use playback::{AudioPlayer, PlaybackOutcome, Player};
pub use tts::{PiperSynthesizer, Waveform, piper_candidates};

/// Active voice quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VoiceSelection {
    #[default]
    Medium,
    High,
}

impl VoiceSelection {
    /// Every selectable voice
    pub const ALL: [Self; 2] = [Self::Medium, Self::High];

    /// Lowercase name used in commands and file names
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// File name of the acoustic model for this voice
    #[must_use]
    pub fn model_file_name(self) -> String {
        format!("en_US-lessac-{}.onnx", self.as_str())
    }
}

impl fmt::Display for VoiceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::Config(format!(
                "unknown voice '{other}' (expected medium or high)"
            ))),
        }
    }
}

/// On-disk file pair backing a voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceModel {
    /// Binary acoustic model (`.onnx`)
    pub model_path: PathBuf,
    /// Companion metadata (`.onnx.json`)
    pub config_path: PathBuf,
}

impl VoiceModel {
    /// Locate the files for `voice` inside `voices_dir`
    #[must_use]
    pub fn locate(voices_dir: &Path, voice: VoiceSelection) -> Self {
        let model_name = voice.model_file_name();
        Self {
            config_path: voices_dir.join(format!("{model_name}.json")),
            model_path: voices_dir.join(model_name),
        }
    }

    /// Files of the pair that do not exist
    #[must_use]
    pub fn missing_files(&self) -> Vec<&Path> {
        [self.model_path.as_path(), self.config_path.as_path()]
            .into_iter()
            .filter(|p| !p.is_file())
            .collect()
    }

    /// Whether both files are present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_files().is_empty()
    }

    /// Fail with [`Error::VoiceMissing`] unless both files are present
    ///
    /// # Errors
    ///
    /// Returns error naming every absent file
    pub fn require(&self) -> Result<()> {
        let missing = self.missing_files();
        if missing.is_empty() {
            return Ok(());
        }

        let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
        Err(Error::VoiceMissing(names.join(", ")))
    }
}

/// Turns reply text into audible speech
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Synthesize and play `text` with `voice`, blocking until playback ends
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] when synthesis fails and [`Error::Playback`]
    /// when the player fails. Neither is fatal to the conversation.
    async fn speak(&self, text: &str, voice: VoiceSelection) -> Result<PlaybackOutcome>;

    /// Whether `voice` can currently be synthesized
    fn voice_available(&self, _voice: VoiceSelection) -> bool {
        true
    }
}

/// Piper synthesis followed by native playback
pub struct SpeechOutput {
    synthesizer: PiperSynthesizer,
    player: AudioPlayer,
    voices_dir: PathBuf,
}

impl SpeechOutput {
    /// Create a speech pipeline reading voices from `voices_dir`
    #[must_use]
    pub const fn new(
        synthesizer: PiperSynthesizer,
        player: AudioPlayer,
        voices_dir: PathBuf,
    ) -> Self {
        Self {
            synthesizer,
            player,
            voices_dir,
        }
    }
}

#[async_trait]
impl Speaker for SpeechOutput {
    async fn speak(&self, text: &str, voice: VoiceSelection) -> Result<PlaybackOutcome> {
        let model = VoiceModel::locate(&self.voices_dir, voice);

        // Scratch directory lives for this turn only
        let scratch = tempfile::Builder::new()
            .prefix("murmur-")
            .tempdir()
            .map_err(|e| Error::Tts(format!("failed to create scratch directory: {e}")))?;
        let wav_path = scratch.path().join("reply.wav");

        let waveform = self.synthesizer.synthesize(text, &model, &wav_path).await?;
        self.player.play(&waveform).await
    }

    fn voice_available(&self, voice: VoiceSelection) -> bool {
        VoiceModel::locate(&self.voices_dir, voice).is_complete()
    }
}
