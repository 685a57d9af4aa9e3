//! Shared test utilities
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use murmur::{ChatBackend, Error, PlaybackOutcome, Player, Result, Speaker, Turn, VoiceSelection};

/// Replies with a fixed answer per question, echoing anything unknown
pub struct ScriptedBackend {
    answers: Vec<(String, String)>,
    pub seen: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl ScriptedBackend {
    pub fn new(answers: &[(&str, &str)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(q, a)| ((*q).to_string(), (*a).to_string()))
                .collect(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, _model: &str, history: &[Turn]) -> Result<String> {
        self.seen.lock().unwrap().push(history.to_vec());
        let last = &history.last().expect("history ends with the user turn").content;
        Ok(self
            .answers
            .iter()
            .find(|(q, _)| q == last)
            .map_or_else(|| format!("echo: {last}"), |(_, a)| a.clone()))
    }
}

/// Every request fails as if the server were down
pub struct FailingBackend {
    pub calls: Arc<Mutex<usize>>,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl ChatBackend for FailingBackend {
    async fn chat(&self, _model: &str, _history: &[Turn]) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        Err(Error::InferenceUnavailable("connection refused".to_string()))
    }
}

/// Records what would have been spoken
pub struct RecordingSpeaker {
    pub spoken: Arc<Mutex<Vec<(String, VoiceSelection)>>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self {
            spoken: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn speak(&self, text: &str, voice: VoiceSelection) -> Result<PlaybackOutcome> {
        self.spoken.lock().unwrap().push((text.to_string(), voice));
        Ok(PlaybackOutcome::Played(Player::Aplay))
    }
}

/// Synthesis always fails
pub struct BrokenSpeaker;

#[async_trait]
impl Speaker for BrokenSpeaker {
    async fn speak(&self, _text: &str, _voice: VoiceSelection) -> Result<PlaybackOutcome> {
        Err(Error::Tts("piper exited with code 1: bad voice file".to_string()))
    }

    fn voice_available(&self, _voice: VoiceSelection) -> bool {
        false
    }
}

/// Write a silent mono WAV with `samples` samples
pub fn write_wav(path: &Path, samples: usize) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..samples {
        writer.write_sample(0_i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Serve a single chunked NDJSON response that sends one line every
/// `interval`
///
/// With `hold_open` the body is never finished: the connection stays open
/// and silent after the last line. Returns the base URL.
pub async fn trickle_server(lines: Vec<String>, interval: Duration, hold_open: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        read_request(&mut socket).await;

        let head = "HTTP/1.1 200 OK\r\n\
                    Content-Type: application/x-ndjson\r\n\
                    Transfer-Encoding: chunked\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }

        for line in lines {
            tokio::time::sleep(interval).await;
            let data = format!("{line}\n");
            let chunk = format!("{:x}\r\n{data}\r\n", data.len());
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
        }

        if hold_open {
            tokio::time::sleep(Duration::from_secs(60)).await;
            return;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}")
}

/// Consume the request headers and body so closing never resets the
/// connection
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}
