//! Speech output tests using stand-in synthesizer scripts
//!
//! Kept in a single test so script files are never written while another
//! test thread is spawning processes.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use murmur::{
    AudioPlayer, Error, PiperSynthesizer, PlaybackOutcome, Player, Speaker, SpeechOutput,
    VoiceModel, VoiceSelection,
};

mod common;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_synthesis_and_playback_paths() {
    let dir = tempfile::tempdir().unwrap();
    let voices = dir.path().join("voices");
    std::fs::create_dir(&voices).unwrap();
    let model = VoiceModel::locate(&voices, VoiceSelection::Medium);
    std::fs::write(&model.model_path, b"onnx").unwrap();
    std::fs::write(&model.config_path, b"{}").unwrap();

    let fixture = dir.path().join("fixture.wav");
    common::write_wav(&fixture, 11025);

    // Copies the fixture to --output_file after draining stdin
    let good = write_script(
        dir.path(),
        "good-piper",
        &format!(
            "cat > /dev/null\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--output_file\" ]; then cp \"{}\" \"$2\"; fi\n  shift\ndone",
            fixture.display()
        ),
    );
    let failing = write_script(
        dir.path(),
        "bad-piper",
        "cat > /dev/null\necho 'Unable to load voice' >&2\nexit 3",
    );
    let silent = write_script(dir.path(), "silent-piper", "cat > /dev/null\nexit 0");

    // Successful synthesis yields a readable waveform
    let out = dir.path().join("reply.wav");
    let waveform = PiperSynthesizer::new(good.clone())
        .synthesize("Hello there", &model, &out)
        .await
        .unwrap();
    assert_eq!(waveform.sample_rate, 22050);
    assert_eq!(waveform.duration.as_millis(), 500);

    // Non-zero exit carries stderr
    let err = PiperSynthesizer::new(failing)
        .synthesize("Hello", &model, &dir.path().join("fail.wav"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tts(_)));
    assert!(err.to_string().contains("code 3"));
    assert!(err.to_string().contains("Unable to load voice"));

    // Exit 0 without output is still a failure
    let err = PiperSynthesizer::new(silent)
        .synthesize("Hello", &model, &dir.path().join("silent.wav"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tts(_)));

    // Installed check only needs the program to start
    PiperSynthesizer::new(good.clone()).check().await.unwrap();

    // Full pipeline without a player: synthesis succeeds, playback skipped
    let speech = SpeechOutput::new(
        PiperSynthesizer::new(good.clone()),
        AudioPlayer::with_probe(vec![Player::Aplay, Player::Paplay], |_| false),
        voices.clone(),
    );
    let outcome = speech.speak("Hello there", VoiceSelection::Medium).await.unwrap();
    assert_eq!(
        outcome,
        PlaybackOutcome::NoPlayer {
            tried: vec!["aplay", "paplay"]
        }
    );

    // Missing voice files fail synthesis without running piper
    let err = speech
        .speak("Hello there", VoiceSelection::High)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tts(_)));
}
