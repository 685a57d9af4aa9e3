//! Conversation loop integration tests
//!
//! Drives the loop with in-memory input and mock backends.

use murmur::{Role, Session, VoiceSelection, session::PROMPT};

mod common;

use common::{BrokenSpeaker, FailingBackend, RecordingSpeaker, ScriptedBackend};

async fn run_session(session: &mut Session, input: &str) -> String {
    let mut out = Vec::new();
    session
        .run(input.as_bytes(), &mut out)
        .await
        .expect("session loop failed");
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_history_grows_two_entries_per_turn() {
    let backend = ScriptedBackend::new(&[]);
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium);

    run_session(&mut session, "one\ntwo\nthree\nquit\n").await;

    let turns = session.history().turns();
    assert_eq!(turns.len(), 6);
    for (i, turn) in turns.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(turn.role, expected);
    }
    let users: Vec<_> = turns
        .iter()
        .filter(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(users, ["one", "two", "three"]);
    assert_eq!(turns[5].content, "echo: three");
}

#[tokio::test]
async fn test_full_history_is_sent_every_turn() {
    let backend = ScriptedBackend::new(&[]);
    let seen = backend.seen.clone();
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium);

    run_session(&mut session, "a\nb\nc\n").await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    for (k, history) in seen.iter().enumerate() {
        assert_eq!(history.len(), 2 * k + 1);
        assert_eq!(history.last().unwrap().role, Role::User);
    }
    assert_eq!(seen[2][0].content, "a");
    assert_eq!(seen[2][2].content, "b");
}

#[tokio::test]
async fn test_long_history_is_never_truncated() {
    let backend = ScriptedBackend::new(&[]);
    let seen = backend.seen.clone();
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium);

    let input: String = (0..300).map(|i| format!("message {i}\n")).collect();
    run_session(&mut session, &input).await;

    assert_eq!(session.history().len(), 600);
    let seen = seen.lock().unwrap();
    let last = seen.last().unwrap();
    assert_eq!(last.len(), 599);
    assert_eq!(last[0].content, "message 0");
}

#[tokio::test]
async fn test_voice_switch_does_not_touch_history() {
    let backend = ScriptedBackend::new(&[]);
    let speaker = RecordingSpeaker::new();
    let spoken = speaker.spoken.clone();
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium)
        .with_speaker(Box::new(speaker));

    let transcript = run_session(
        &mut session,
        "hello\nvoice:high\nvoice:medium\nvoice:HIGH\nagain\n",
    )
    .await;

    assert_eq!(session.history().len(), 4);
    assert_eq!(session.voice(), VoiceSelection::High);
    assert!(transcript.contains("Switched to high quality voice"));
    assert!(transcript.contains("Switched to medium quality voice"));

    let spoken = spoken.lock().unwrap();
    assert_eq!(spoken.len(), 2);
    assert_eq!(spoken[0], ("echo: hello".to_string(), VoiceSelection::Medium));
    assert_eq!(spoken[1], ("echo: again".to_string(), VoiceSelection::High));
}

#[tokio::test]
async fn test_unknown_voice_is_ignored() {
    let backend = ScriptedBackend::new(&[]);
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::High);

    let transcript = run_session(&mut session, "voice:low\n").await;

    assert_eq!(session.voice(), VoiceSelection::High);
    assert!(session.history().is_empty());
    assert!(transcript.contains("Unknown voice: low (available: medium, high)"));
}

#[tokio::test]
async fn test_voice_switch_warns_when_files_missing() {
    let backend = ScriptedBackend::new(&[]);
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium)
        .with_speaker(Box::new(BrokenSpeaker));

    let transcript = run_session(&mut session, "voice:high\n").await;

    assert_eq!(session.voice(), VoiceSelection::High);
    assert!(transcript.contains("voice files for 'high' are missing"));
}

#[tokio::test]
async fn test_failing_backend_never_appends_assistant() {
    let backend = FailingBackend::new();
    let calls = backend.calls.clone();
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium);

    let transcript = run_session(&mut session, "first\nsecond\nquit\n").await;

    assert_eq!(*calls.lock().unwrap(), 2);
    assert!(session.history().is_empty());
    assert_eq!(transcript.matches("Error: inference unavailable").count(), 2);
    assert!(transcript.ends_with("Goodbye!\n"));
}

#[tokio::test]
async fn test_reply_is_echoed() {
    let backend = ScriptedBackend::new(&[("capital of France?", "Paris")]);
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium);

    let transcript = run_session(&mut session, "capital of France?\n").await;

    assert!(transcript.contains("You: capital of France?"));
    let assistant_line = transcript
        .lines()
        .find(|l| l.contains("Assistant:"))
        .expect("assistant line missing");
    assert!(assistant_line.contains("Paris"));
}

#[tokio::test]
async fn test_exit_words_end_the_loop() {
    for word in ["quit", "exit", "bye", "QUIT", "  Exit  ", "\tbye"] {
        let backend = FailingBackend::new();
        let calls = backend.calls.clone();
        let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium);

        let transcript = run_session(&mut session, &format!("{word}\nhello\n")).await;

        assert_eq!(*calls.lock().unwrap(), 0, "{word:?} did not stop the loop");
        assert_eq!(transcript.matches(PROMPT).count(), 1);
        assert!(transcript.ends_with("Goodbye!\n"));
    }
}

#[tokio::test]
async fn test_end_of_input_exits_gracefully() {
    let backend = ScriptedBackend::new(&[]);
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium);

    let transcript = run_session(&mut session, "hi").await;

    assert_eq!(session.history().len(), 2);
    assert!(transcript.ends_with("Goodbye!\n"));
}

#[tokio::test]
async fn test_blank_lines_are_ignored() {
    let backend = FailingBackend::new();
    let calls = backend.calls.clone();
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium);

    let transcript = run_session(&mut session, "\n   \n\t\n").await;

    assert_eq!(*calls.lock().unwrap(), 0);
    assert!(session.history().is_empty());
    assert_eq!(transcript.matches(PROMPT).count(), 4);
}

#[tokio::test]
async fn test_synthesis_failure_still_prints_reply_once() {
    let backend = ScriptedBackend::new(&[("capital of France?", "Paris")]);
    let mut session = Session::new(Box::new(backend), "llama3.2", VoiceSelection::Medium)
        .with_speaker(Box::new(BrokenSpeaker));

    let transcript = run_session(&mut session, "capital of France?\nquit\n").await;

    assert_eq!(transcript.matches("Paris").count(), 1);
    assert!(transcript.contains("Warning: TTS error"));
    assert_eq!(session.history().len(), 2);
    assert!(transcript.ends_with("Goodbye!\n"));
}
