//! Model pull progress stream (newline-delimited JSON)

use std::io::Write;

use serde::Deserialize;

/// One line of the `/api/pull` progress stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PullProgress {
    /// Percentage of the current layer downloaded, when known
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        match (self.completed, self.total) {
            (Some(completed), Some(total)) if total > 0 => {
                Some(completed as f64 / total as f64 * 100.0)
            }
            _ => None,
        }
    }
}

/// Remove every complete line from `buf`, leaving a trailing partial line
pub fn split_ndjson_lines(buf: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if !line.iter().all(u8::is_ascii_whitespace) {
            lines.push(line);
        }
    }
    lines
}

/// Renders pull progress for a terminal
///
/// Each distinct status is printed once; byte progress is rewritten in place.
pub struct PullReporter<'a> {
    out: &'a mut dyn Write,
    last_status: String,
    in_progress_line: bool,
}

impl<'a> PullReporter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            out,
            last_status: String::new(),
            in_progress_line: false,
        }
    }

    /// Render one progress update
    ///
    /// # Errors
    ///
    /// Returns error if writing to the terminal fails
    pub fn report(&mut self, progress: &PullProgress) -> std::io::Result<()> {
        if let Some(status) = progress.status.as_deref()
            && !status.is_empty()
            && status != self.last_status
            && !status.contains('%')
        {
            if self.in_progress_line {
                writeln!(self.out)?;
                self.in_progress_line = false;
            }
            writeln!(self.out, "   {status}")?;
            self.last_status = status.to_string();
        }

        if let Some(pct) = progress.percent() {
            write!(self.out, "\r   Downloading: {pct:.1}%")?;
            self.out.flush()?;
            self.in_progress_line = true;
        }

        Ok(())
    }

    /// Terminate a pending in-place progress line
    ///
    /// # Errors
    ///
    /// Returns error if writing to the terminal fails
    pub fn finish(&mut self) -> std::io::Result<()> {
        if self.in_progress_line {
            writeln!(self.out)?;
            self.in_progress_line = false;
        }
        Ok(())
    }
}
