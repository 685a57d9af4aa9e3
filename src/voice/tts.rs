//! Text-to-speech via the Piper CLI

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::VoiceModel;
use crate::{Error, Result};

/// Default bound on a single synthesis run
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound on the `--help` installation probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(windows)]
const PIPER_BIN: &str = "piper.exe";
#[cfg(not(windows))]
const PIPER_BIN: &str = "piper";

/// Synthesized audio on disk
#[derive(Debug, Clone)]
pub struct Waveform {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl Waveform {
    /// Read the WAV header of `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, not a WAV, or holds no samples
    pub fn inspect(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| Error::Tts(format!("no usable audio generated: {e}")))?;

        let spec = reader.spec();
        let frames = reader.duration();
        if frames == 0 || spec.sample_rate == 0 {
            return Err(Error::Tts("synthesizer produced empty audio".to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            sample_rate: spec.sample_rate,
            duration: Duration::from_secs_f64(f64::from(frames) / f64::from(spec.sample_rate)),
        })
    }
}

/// Candidate Piper locations, most specific first
///
/// Project virtualenvs win over a binary next to the running executable,
/// which wins over `PATH`.
#[must_use]
pub fn piper_candidates(cwd: &Path, exe_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![
        cwd.join("venv").join("bin").join("piper"),
        cwd.join("venv").join("Scripts").join("piper.exe"),
    ];
    if let Some(dir) = exe_dir {
        candidates.push(dir.join(PIPER_BIN));
    }
    candidates
}

/// Runs the Piper executable
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    program: PathBuf,
    timeout: Duration,
}

impl PiperSynthesizer {
    /// Create a synthesizer for an already resolved executable
    #[must_use]
    pub const fn new(program: PathBuf) -> Self {
        Self {
            program,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-run timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executable this synthesizer runs
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Find the Piper executable
    ///
    /// An explicit path (or bare command name) is used as given when it
    /// resolves; otherwise the usual install locations are searched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SynthesizerMissing`] if nothing resolves
    pub fn resolve(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return which::which(path).map_err(|_| {
                Error::SynthesizerMissing(format!("'{}' not found", path.display()))
            });
        }

        let cwd = std::env::current_dir()?;
        let exe = std::env::current_exe().ok();
        let exe_dir = exe.as_deref().and_then(Path::parent);

        if let Some(found) = piper_candidates(&cwd, exe_dir)
            .into_iter()
            .find(|p| p.is_file())
        {
            tracing::debug!(path = %found.display(), "found piper");
            return Ok(found);
        }

        which::which("piper")
            .map_err(|_| Error::SynthesizerMissing("'piper' not found on PATH".to_string()))
    }

    /// Confirm the executable starts
    ///
    /// # Errors
    ///
    /// Returns [`Error::SynthesizerMissing`] if it cannot be spawned or hangs
    pub async fn check(&self) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            Error::SynthesizerMissing(format!("failed to run {}: {e}", self.program.display()))
        })?;

        timeout(PROBE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::SynthesizerMissing(format!("{} --help timed out", self.program.display()))
            })?
            .map_err(|e| Error::SynthesizerMissing(e.to_string()))?;

        Ok(())
    }

    /// Synthesize `text` into a WAV file at `output`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] if the voice files are missing, Piper fails or
    /// times out, or no audio was written
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceModel,
        output: &Path,
    ) -> Result<Waveform> {
        voice
            .require()
            .map_err(|e| Error::Tts(e.to_string()))?;

        tracing::info!(
            voice = %voice.model_path.display(),
            chars = text.chars().count(),
            "generating speech"
        );

        let mut child = Command::new(&self.program)
            .arg("--model")
            .arg(&voice.model_path)
            .arg("--output_file")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Tts(format!("failed to spawn {}: {e}", self.program.display())))?;

        // Stdin is closed at the end of this block so Piper sees EOF
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| Error::Tts(format!("failed to write to piper stdin: {e}")))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| Error::Tts(format!("failed to write to piper stdin: {e}")))?;
        }

        let result = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Tts(format!("speech generation timed out after {:?}", self.timeout))
            })?
            .map_err(|e| Error::Tts(format!("piper execution failed: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let code = result.status.code().unwrap_or(-1);
            return Err(Error::Tts(format!(
                "piper exited with code {code}: {}",
                stderr.trim()
            )));
        }

        let waveform = Waveform::inspect(output)?;
        tracing::debug!(
            sample_rate = waveform.sample_rate,
            duration_ms = waveform.duration.as_millis(),
            "speech generated"
        );
        Ok(waveform)
    }
}
