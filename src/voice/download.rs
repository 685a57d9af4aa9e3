//! Fetching Piper voice files from the public voice repository

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;

use super::VoiceModel;
use crate::{Error, Result};

/// Public Piper voice repository, pinned to a release
pub const DEFAULT_VOICE_BASE_URL: &str =
    "https://huggingface.co/rhasspy/piper-voices/resolve/v1.0.0/en/en_US/lessac";

/// Longest a voice download may go without receiving data
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Where voice files are downloaded from
#[derive(Debug, Clone)]
pub struct VoiceSource {
    base_url: String,
    idle_timeout: Duration,
}

impl Default for VoiceSource {
    fn default() -> Self {
        Self::new(DEFAULT_VOICE_BASE_URL)
    }
}

impl VoiceSource {
    /// Source serving `<base_url>/<quality>/<file name>`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Override how long a download may stall
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Download URL for a known voice file name
    #[must_use]
    pub fn url_for(&self, file_name: &str) -> Option<String> {
        let quality = file_name
            .strip_prefix("en_US-lessac-")?
            .strip_suffix(".onnx")
            .or_else(|| file_name.strip_prefix("en_US-lessac-")?.strip_suffix(".onnx.json"))?;

        matches!(quality, "medium" | "high")
            .then(|| format!("{}/{quality}/{file_name}", self.base_url))
    }
}

/// Download whichever files of `model` are absent
///
/// Progress is written to `out`. Files are streamed into a temporary file
/// beside the destination and renamed into place once complete, so a failed
/// download leaves nothing behind.
///
/// # Errors
///
/// Returns [`Error::VoiceMissing`] if a file has no known source or the
/// download fails
pub async fn download_missing(
    client: &reqwest::Client,
    source: &VoiceSource,
    model: &VoiceModel,
    out: &mut dyn Write,
) -> Result<()> {
    for path in [&model.model_path, &model.config_path] {
        if path.is_file() {
            continue;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::VoiceMissing(path.display().to_string()))?;
        let url = source.url_for(file_name).ok_or_else(|| {
            Error::VoiceMissing(format!("{} (no download source known)", path.display()))
        })?;

        writeln!(out, "Downloading voice file '{file_name}'...")?;
        download_file(client, &url, path, source.idle_timeout, out)
            .await
            .map_err(|e| Error::VoiceMissing(format!("failed to download {file_name}: {e}")))?;
        writeln!(out, "\nVoice file '{file_name}' downloaded")?;
        tracing::info!(path = %path.display(), %url, "downloaded voice file");
    }

    Ok(())
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    idle: Duration,
    out: &mut dyn Write,
) -> Result<()> {
    let stalled = || {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no data for {}s", idle.as_secs_f32()),
        ))
    };

    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let response = tokio::time::timeout(idle, client.get(url).send())
        .await
        .map_err(|_| stalled())??
        .error_for_status()?;
    let total = response.content_length().unwrap_or(0);

    let mut partial = tempfile::NamedTempFile::new_in(dir)?;
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = tokio::time::timeout(idle, stream.next())
        .await
        .map_err(|_| stalled())?
    {
        let chunk = chunk?;
        partial.write_all(&chunk)?;
        downloaded += chunk.len() as u64;

        if total > 0 {
            #[allow(clippy::cast_precision_loss)]
            let pct = downloaded as f64 / total as f64 * 100.0;
            write!(out, "\r   Downloading: {pct:.1}%")?;
            out.flush()?;
        }
    }

    partial.flush()?;
    partial.persist(dest).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
