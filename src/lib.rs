//! Murmur - local voice chatbot
//!
//! Sends what you type to a local Ollama server and speaks the reply with
//! the Piper text-to-speech CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐   ┌────────────┐
//! │ terminal │──▶│ Conversation │──▶│  Ollama   │──▶│   Piper    │──▶ native player
//! │  input   │   │    State     │   │ /api/chat │   │ (WAV file) │   (aplay, afplay, ...)
//! └──────────┘   └──────────────┘   └───────────┘   └────────────┘
//! ```
//!
//! One turn is fully processed before the next line is read.

pub mod bootstrap;
pub mod config;
pub mod conversation;
pub mod error;
pub mod inference;
pub mod session;
pub mod voice;

pub use config::Config;
pub use conversation::{ConversationState, Role, Turn};
pub use error::{Error, Result};
pub use inference::{ChatBackend, OllamaClient};
pub use session::{Input, Session, parse_input};
pub use voice::{
    AudioPlayer, PiperSynthesizer, PlaybackOutcome, Player, Speaker, SpeechOutput, VoiceModel,
    VoiceSelection,
};
