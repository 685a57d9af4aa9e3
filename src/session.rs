//! Interactive conversation loop
//!
//! ```text
//! AwaitingInput ──quit/exit/bye, EOF, Ctrl-C──▶ Exiting
//!      │   ▲
//!      │   └── empty line, voice:<name>, turn finished or failed
//!      ▼
//!  Processing: chat ─▶ echo reply ─▶ speak
//! ```

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::Result;
use crate::conversation::ConversationState;
use crate::inference::ChatBackend;
use crate::voice::{PlaybackOutcome, Speaker, VoiceSelection};

/// Words that end the session
const EXIT_WORDS: [&str; 3] = ["quit", "exit", "bye"];

/// Prefix of the voice-switch command
const VOICE_PREFIX: &str = "voice:";

/// Prompt shown while awaiting input
pub const PROMPT: &str = "> ";

/// One parsed line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Nothing to do
    Empty,
    /// End the session
    Quit,
    /// Switch to a known voice
    SwitchVoice(VoiceSelection),
    /// `voice:` followed by an unrecognized name
    UnknownVoice(String),
    /// A new dialogue turn
    Message(String),
}

/// Classify a raw input line
#[must_use]
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }

    if EXIT_WORDS.iter().any(|w| trimmed.eq_ignore_ascii_case(w)) {
        return Input::Quit;
    }

    if let Some(prefix) = trimmed.get(..VOICE_PREFIX.len())
        && prefix.eq_ignore_ascii_case(VOICE_PREFIX)
    {
        let name = trimmed[VOICE_PREFIX.len()..].trim();
        return name
            .parse::<VoiceSelection>()
            .map_or_else(|_| Input::UnknownVoice(name.to_string()), Input::SwitchVoice);
    }

    Input::Message(trimmed.to_string())
}

/// Print the startup banner listing the interactive commands
///
/// # Errors
///
/// Returns error if writing fails
pub fn write_banner(out: &mut dyn Write) -> std::io::Result<()> {
    let rule = "=".repeat(60);
    writeln!(out, "{rule}")?;
    writeln!(out, "murmur: local voice chat")?;
    writeln!(out, "{rule}")?;
    writeln!(out, "Commands:")?;
    writeln!(out, "  - Type your message and press Enter")?;
    writeln!(out, "  - Type 'voice:medium' or 'voice:high' to switch voices")?;
    writeln!(out, "  - Type 'quit', 'exit' or 'bye' to end")?;
    writeln!(out, "{rule}\n")
}

/// A running conversation
///
/// Owns the dialogue history and the active voice; both change only through
/// [`Session::handle_line`].
pub struct Session {
    backend: Box<dyn ChatBackend>,
    speaker: Option<Box<dyn Speaker>>,
    model: String,
    voice: VoiceSelection,
    history: ConversationState,
}

impl Session {
    /// Create a session answering with `model` through `backend`
    pub fn new(
        backend: Box<dyn ChatBackend>,
        model: impl Into<String>,
        voice: VoiceSelection,
    ) -> Self {
        Self {
            backend,
            speaker: None,
            model: model.into(),
            voice,
            history: ConversationState::new(),
        }
    }

    /// Speak replies through `speaker`
    #[must_use]
    pub fn with_speaker(mut self, speaker: Box<dyn Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// Dialogue so far
    #[must_use]
    pub const fn history(&self) -> &ConversationState {
        &self.history
    }

    /// Currently selected voice
    #[must_use]
    pub const fn voice(&self) -> VoiceSelection {
        self.voice
    }

    /// Read lines from `input` until the user quits or input ends
    ///
    /// # Errors
    ///
    /// Returns error only if reading input or writing the transcript fails;
    /// inference and speech failures are reported and the loop continues.
    pub async fn run<R>(&mut self, input: R, out: &mut dyn Write) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        loop {
            write!(out, "{PROMPT}")?;
            out.flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                Ok(()) = tokio::signal::ctrl_c() => {
                    writeln!(out)?;
                    None
                }
            };

            let Some(line) = line else {
                tracing::debug!("input closed");
                writeln!(out, "Goodbye!")?;
                return Ok(());
            };

            // Ctrl-C mid-turn ends the session; dropping the turn kills its children
            let outcome = tokio::select! {
                keep_going = self.handle_line(&line, out) => Some(keep_going?),
                Ok(()) = tokio::signal::ctrl_c() => None,
            };

            match outcome {
                Some(true) => {}
                Some(false) => return Ok(()),
                None => {
                    tracing::debug!("interrupted during turn");
                    writeln!(out, "\nGoodbye!")?;
                    return Ok(());
                }
            }
        }
    }

    /// Process one input line
    ///
    /// Returns `false` once the session should end.
    ///
    /// # Errors
    ///
    /// Returns error if writing the transcript fails
    pub async fn handle_line(&mut self, line: &str, out: &mut dyn Write) -> Result<bool> {
        match parse_input(line) {
            Input::Empty => {}
            Input::Quit => {
                writeln!(out, "Goodbye!")?;
                return Ok(false);
            }
            Input::SwitchVoice(voice) => {
                self.voice = voice;
                writeln!(out, "Switched to {voice} quality voice")?;
                if self.speaker.as_ref().is_some_and(|s| !s.voice_available(voice)) {
                    writeln!(
                        out,
                        "Warning: voice files for '{voice}' are missing; replies will not be spoken"
                    )?;
                }
                tracing::info!(%voice, "voice switched");
            }
            Input::UnknownVoice(name) => {
                let available = VoiceSelection::ALL.map(VoiceSelection::as_str);
                writeln!(out, "Unknown voice: {name} (available: {})", available.join(", "))?;
            }
            Input::Message(text) => self.process_turn(&text, out).await?,
        }

        Ok(true)
    }

    async fn process_turn(&mut self, text: &str, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "You: {text}")?;
        self.history.push_user(text);

        let reply = match self.backend.chat(&self.model, self.history.turns()).await {
            Ok(reply) => reply,
            Err(e) => {
                self.history.discard_unanswered();
                tracing::warn!(error = %e, "chat request failed");
                writeln!(out, "Error: {e}")?;
                return Ok(());
            }
        };

        self.history.push_assistant(reply.as_str());
        tracing::debug!(
            turns = self.history.len(),
            chars = self.history.char_count(),
            "conversation history grew"
        );
        writeln!(out, "Assistant: {reply}")?;

        if let Some(speaker) = &self.speaker {
            match speaker.speak(&reply, self.voice).await {
                Ok(PlaybackOutcome::Played(player)) => {
                    tracing::debug!(player = player.program(), "reply spoken");
                }
                Ok(PlaybackOutcome::NoPlayer { tried }) => {
                    writeln!(
                        out,
                        "Warning: no audio player found (tried: {})",
                        tried.join(", ")
                    )?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "speech output failed");
                    writeln!(out, "Warning: {e}")?;
                }
            }
        }

        Ok(())
    }
}
