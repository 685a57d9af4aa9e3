//! Audio playback through native player executables

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use super::Waveform;
use crate::{Error, Result};

/// Floor for the playback timeout
const MIN_PLAYBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra time allowed beyond the audio duration
const PLAYBACK_SLACK: Duration = Duration::from_secs(10);

/// Known native audio players
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    /// Windows `Media.SoundPlayer` via `PowerShell`
    PowerShell,
    /// macOS built-in player
    Afplay,
    /// ALSA
    Aplay,
    /// `PulseAudio` / `PipeWire`
    Paplay,
    /// `FFmpeg` player
    Ffplay,
}

impl Player {
    /// Executable name
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::PowerShell => "powershell",
            Self::Afplay => "afplay",
            Self::Aplay => "aplay",
            Self::Paplay => "paplay",
            Self::Ffplay => "ffplay",
        }
    }

    /// Arguments that play `wav` and exit when done
    #[must_use]
    pub fn args(self, wav: &Path) -> Vec<String> {
        let path = wav.display().to_string();
        match self {
            Self::PowerShell => vec![
                "-c".to_string(),
                format!(
                    "(New-Object Media.SoundPlayer '{}').PlaySync()",
                    path.replace('\'', "''")
                ),
            ],
            Self::Afplay | Self::Aplay | Self::Paplay => vec![path],
            Self::Ffplay => vec![
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
                path,
            ],
        }
    }

    /// Ranked candidates for an OS name as reported by `std::env::consts::OS`
    #[must_use]
    pub fn candidates_for(os: &str) -> Vec<Self> {
        match os {
            "windows" => vec![Self::PowerShell],
            "macos" => vec![Self::Afplay],
            _ => vec![Self::Aplay, Self::Paplay, Self::Ffplay],
        }
    }
}

/// Result of a playback attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Audio was played to completion
    Played(Player),
    /// No candidate player is installed
    NoPlayer { tried: Vec<&'static str> },
}

/// Plays waveforms with the first available native player
///
/// Candidates are probed once; the choice is cached for the process lifetime.
pub struct AudioPlayer {
    candidates: Vec<Player>,
    probe: fn(&str) -> bool,
    selected: OnceLock<Option<Player>>,
}

impl AudioPlayer {
    /// Create a player using this host's candidate list
    #[must_use]
    pub fn new() -> Self {
        Self::with_probe(Player::candidates_for(std::env::consts::OS), |program| {
            which::which(program).is_ok()
        })
    }

    /// Create a player with explicit candidates and availability probe
    #[must_use]
    pub fn with_probe(candidates: Vec<Player>, probe: fn(&str) -> bool) -> Self {
        Self {
            candidates,
            probe,
            selected: OnceLock::new(),
        }
    }

    /// First available candidate, probed on first use
    pub fn select(&self) -> Option<Player> {
        *self.selected.get_or_init(|| {
            let found = self
                .candidates
                .iter()
                .copied()
                .find(|p| (self.probe)(p.program()));
            match found {
                Some(player) => tracing::debug!(player = player.program(), "selected audio player"),
                None => tracing::warn!(
                    tried = ?self.tried(),
                    "no audio player available"
                ),
            }
            found
        })
    }

    fn tried(&self) -> Vec<&'static str> {
        self.candidates.iter().map(|p| p.program()).collect()
    }

    /// Play `waveform`, blocking until the player exits
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playback`] if the player fails or times out
    pub async fn play(&self, waveform: &Waveform) -> Result<PlaybackOutcome> {
        let Some(player) = self.select() else {
            return Ok(PlaybackOutcome::NoPlayer {
                tried: self.tried(),
            });
        };

        let limit = playback_timeout(waveform.duration);
        tracing::info!(
            player = player.program(),
            duration_ms = waveform.duration.as_millis(),
            "playing audio"
        );

        let child = Command::new(player.program())
            .args(player.args(&waveform.path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Playback(format!("failed to start {}: {e}", player.program())))?;

        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| Error::Playback(format!("audio playback timed out after {limit:?}")))?
            .map_err(|e| Error::Playback(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                "unknown error".to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::Playback(format!("{}: {detail}", player.program())));
        }

        tracing::debug!(player = player.program(), "playback complete");
        Ok(PlaybackOutcome::Played(player))
    }
}

impl Default for AudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Time allowed for playing `duration` of audio
fn playback_timeout(duration: Duration) -> Duration {
    (duration + PLAYBACK_SLACK).max(MIN_PLAYBACK_TIMEOUT)
}
