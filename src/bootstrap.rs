//! Startup checks run before the first prompt
//!
//! Every step either succeeds or returns a fatal error; nothing here is
//! retried once the conversation has begun.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::inference::{OllamaClient, PullReporter, resolve_model_name};
use crate::voice::{PiperSynthesizer, VoiceModel, VoiceSource, download_missing};
use crate::{Config, Error, Result};

/// How long a spawned server gets to come up
const SERVER_START_ATTEMPTS: u32 = 30;
const SERVER_START_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the conversation needs from a successful bootstrap
#[derive(Debug)]
pub struct Ready {
    /// Model name as installed on the server (may carry a `:latest` tag)
    pub model: String,

    /// Synthesizer, absent in text-only mode
    pub synthesizer: Option<PiperSynthesizer>,
}

/// Run all startup checks, writing progress to `out`
///
/// # Errors
///
/// Returns a fatal error (see [`Error::is_fatal`]) when the server is
/// unreachable, the model cannot be pulled, or speech is enabled and Piper
/// or the voice files are missing
pub async fn bootstrap(
    config: &Config,
    client: &OllamaClient,
    out: &mut dyn Write,
) -> Result<Ready> {
    let launcher = config.start_server.then(ServerLauncher::new);
    ensure_server(client, launcher.as_ref(), out).await?;
    let model = ensure_model(client, &config.model, out).await?;

    let synthesizer = if config.speech_enabled {
        let synth = ensure_synthesizer(config, out).await?;
        ensure_voice(config, client, out).await?;
        Some(synth)
    } else {
        writeln!(out, "Speech output disabled")?;
        None
    };

    Ok(Ready { model, synthesizer })
}

/// Install locations checked after `PATH` when looking for `ollama`
#[must_use]
pub fn ollama_candidates(
    local_app_data: Option<&Path>,
    program_files: Option<&Path>,
) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = local_app_data {
        candidates.push(dir.join("Programs").join("Ollama").join("ollama.exe"));
    }
    if let Some(dir) = program_files {
        candidates.push(dir.join("Ollama").join("ollama.exe"));
    }
    candidates
}

/// Starts `ollama serve` and waits for it to answer
#[derive(Debug, Clone)]
pub struct ServerLauncher {
    program: Option<PathBuf>,
    attempts: u32,
    interval: Duration,
}

impl Default for ServerLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLauncher {
    /// Launcher that searches for `ollama` and waits up to 30 s
    #[must_use]
    pub const fn new() -> Self {
        Self {
            program: None,
            attempts: SERVER_START_ATTEMPTS,
            interval: SERVER_START_INTERVAL,
        }
    }

    /// Use `program` instead of searching for `ollama`
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Re-probe `attempts` times, `interval` apart
    #[must_use]
    pub const fn with_wait(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts;
        self.interval = interval;
        self
    }

    fn locate(&self) -> Option<PathBuf> {
        if let Some(program) = &self.program {
            return program.is_file().then(|| program.clone());
        }

        if let Ok(found) = which::which("ollama") {
            return Some(found);
        }

        let local_app_data = std::env::var_os("LOCALAPPDATA").map(PathBuf::from);
        let program_files = std::env::var_os("PROGRAMFILES").map(PathBuf::from);
        ollama_candidates(local_app_data.as_deref(), program_files.as_deref())
            .into_iter()
            .find(|p| p.is_file())
    }

    fn spawn(&self, client: &OllamaClient) -> Result<()> {
        let program = self.locate().ok_or_else(|| Error::ServerUnreachable {
            url: client.base_url().to_string(),
            reason: "server is down and the `ollama` executable was not found".to_string(),
        })?;

        let mut cmd = Command::new(&program);
        cmd.arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Detach so the server outlives this session
        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NO_WINDOW);
        }

        cmd.spawn().map_err(|e| Error::ServerUnreachable {
            url: client.base_url().to_string(),
            reason: format!("failed to start {}: {e}", program.display()),
        })?;

        tracing::info!(program = %program.display(), "spawned inference server");
        Ok(())
    }
}

/// Confirm the inference server answers, starting it through `launcher`
/// when one is given
///
/// # Errors
///
/// Returns [`Error::ServerUnreachable`] if it never answers
pub async fn ensure_server(
    client: &OllamaClient,
    launcher: Option<&ServerLauncher>,
    out: &mut dyn Write,
) -> Result<()> {
    let probe = client.list_models().await;
    let Err(err) = probe else {
        writeln!(out, "Inference server is running")?;
        return Ok(());
    };

    let Some(launcher) = launcher else {
        return Err(err);
    };

    writeln!(out, "Inference server not running, attempting to start...")?;
    launcher.spawn(client)?;

    write!(out, "   Waiting for server to start")?;
    out.flush()?;
    for _ in 0..launcher.attempts {
        tokio::time::sleep(launcher.interval).await;
        write!(out, ".")?;
        out.flush()?;
        if client.is_running().await {
            writeln!(out, " started")?;
            return Ok(());
        }
    }

    writeln!(out, " timeout")?;
    Err(Error::ServerUnreachable {
        url: client.base_url().to_string(),
        reason: format!(
            "server did not start within {}s",
            (launcher.interval * launcher.attempts).as_secs_f32()
        ),
    })
}

/// Resolve `requested` against installed models, pulling it when absent
///
/// # Errors
///
/// Returns [`Error::ServerUnreachable`] if listing fails and
/// [`Error::ModelPull`] if the download fails
pub async fn ensure_model(
    client: &OllamaClient,
    requested: &str,
    out: &mut dyn Write,
) -> Result<String> {
    let available = client.list_models().await?;

    if let Some(model) = resolve_model_name(requested, &available) {
        writeln!(out, "Model '{model}' ready")?;
        return Ok(model);
    }

    writeln!(out, "Pulling '{requested}'... (this may take a few minutes)")?;
    {
        let mut reporter = PullReporter::new(&mut *out);
        client
            .pull_model(requested, |progress| reporter.report(progress))
            .await?;
        reporter.finish()?;
    }
    writeln!(out, "Model '{requested}' ready")?;

    Ok(requested.to_string())
}

/// Locate Piper and confirm it runs
///
/// # Errors
///
/// Returns [`Error::SynthesizerMissing`] if it cannot be found or started
pub async fn ensure_synthesizer(
    config: &Config,
    out: &mut dyn Write,
) -> Result<PiperSynthesizer> {
    let program = PiperSynthesizer::resolve(config.piper.as_deref())?;
    let synth = PiperSynthesizer::new(program).with_timeout(config.synthesis_timeout);
    synth.check().await?;

    writeln!(out, "Piper TTS installed ({})", synth.program().display())?;
    Ok(synth)
}

/// Confirm the selected voice's files exist, downloading when allowed
///
/// # Errors
///
/// Returns [`Error::VoiceMissing`] if the files are absent afterwards
pub async fn ensure_voice(
    config: &Config,
    client: &OllamaClient,
    out: &mut dyn Write,
) -> Result<()> {
    let model = VoiceModel::locate(&config.voices_dir, config.voice);

    if config.download_voices && !model.is_complete() {
        let source = VoiceSource::new(config.voice_download_url.as_str());
        download_missing(client.http(), &source, &model, out).await?;
    }

    model.require()?;
    writeln!(out, "Voice '{}' ready ({})", config.voice, model.model_path.display())?;
    Ok(())
}
