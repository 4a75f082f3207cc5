//! Conversation orchestration tests
//!
//! Drives the orchestrator with mock backends and a recording sink, no
//! audio hardware or network required.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use aria_engine::audio::{AudioSink, PlaybackController, PlaybackHandle};
use aria_engine::config::HistoryConfig;
use aria_engine::emotion::{EmotionTag, KeywordTable};
use aria_engine::history::ConversationHistory;
use aria_engine::llm::ChatBackend;
use aria_engine::stt::{Transcript, transcript_channel};
use aria_engine::tts::Synthesizer;
use aria_engine::{ConversationOrchestrator, ConversationTurn, Error, Result};

mod common;
use common::wav_bytes;

/// Chat backend replying from a script
struct MockChat {
    replies: Mutex<Vec<Result<String>>>,
    calls: Mutex<Vec<String>>,
}

impl MockChat {
    fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for MockChat {
    async fn reply(&self, text: &str, _context: &[ConversationTurn]) -> Result<String> {
        self.calls.lock().unwrap().push(text.to_string());
        self.replies.lock().unwrap().remove(0)
    }
}

/// Synthesizer recording what it was asked to speak
struct MockSynthesizer {
    calls: Mutex<Vec<(String, EmotionTag)>>,
    fail: bool,
    /// Observed cancel state of earlier playback sessions at synthesis time
    sessions: Arc<SessionLog>,
    prior_cancelled: Mutex<Vec<bool>>,
}

impl MockSynthesizer {
    fn new(sessions: Arc<SessionLog>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
            sessions,
            prior_cancelled: Mutex::new(Vec::new()),
        })
    }

    fn failing(sessions: Arc<SessionLog>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
            sessions,
            prior_cancelled: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, emotion: EmotionTag) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push((text.to_string(), emotion));
        self.prior_cancelled
            .lock()
            .unwrap()
            .push(self.sessions.all_cancelled());
        if self.fail {
            return Err(Error::Tts("voice server down".to_string()));
        }
        Ok(wav_bytes(&[0.1; 160], 16_000))
    }
}

/// Sink that records sessions and holds them open until cancelled
#[derive(Default)]
struct SessionLog {
    handles: Mutex<Vec<PlaybackHandle>>,
}

impl SessionLog {
    fn count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    fn cancelled(&self, index: usize) -> bool {
        self.handles.lock().unwrap()[index].is_cancelled()
    }

    fn all_cancelled(&self) -> bool {
        self.handles.lock().unwrap().iter().all(|h| h.is_cancelled() || h.is_done())
    }
}

struct HoldingSink {
    log: Arc<SessionLog>,
}

impl AudioSink for HoldingSink {
    fn start(&self, _samples: Vec<f32>, _sample_rate: u32, handle: PlaybackHandle) -> Result<()> {
        self.log.handles.lock().unwrap().push(handle);
        Ok(())
    }
}

fn history_in(dir: &tempfile::TempDir) -> ConversationHistory {
    ConversationHistory::load(&HistoryConfig {
        path: dir.path().join("history.jsonl"),
        context_window: 10,
    })
}

fn interrupt_phrases() -> Vec<String> {
    ["stop", "quiet", "silence", "shut up"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn orchestrator(
    chat: Arc<MockChat>,
    synth: Arc<MockSynthesizer>,
    log: Arc<SessionLog>,
    history: ConversationHistory,
) -> ConversationOrchestrator {
    ConversationOrchestrator::new(
        chat,
        synth,
        PlaybackController::new(Arc::new(HoldingSink { log })),
        history,
        KeywordTable::default(),
        interrupt_phrases(),
    )
}

fn transcript(text: &str, sequence: u64) -> Transcript {
    Transcript {
        text: text.to_string(),
        sequence,
    }
}

#[tokio::test]
async fn happy_path_plays_once_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(SessionLog::default());
    let chat = MockChat::new(vec![Ok("Hi there!".to_string())]);
    let synth = MockSynthesizer::new(Arc::clone(&log));

    let mut orch = orchestrator(
        Arc::clone(&chat),
        Arc::clone(&synth),
        Arc::clone(&log),
        history_in(&dir),
    );

    orch.handle_transcript(transcript("hello aria", 0)).await;

    assert_eq!(chat.call_count(), 1);
    assert_eq!(log.count(), 1);
    assert_eq!(orch.history_len(), 2);

    // "Hi there!" classifies happy and the synthesizer saw that tag
    let calls = synth.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("Hi there!".to_string(), EmotionTag::Happy));
}

#[tokio::test]
async fn barge_in_cancels_before_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(SessionLog::default());
    let chat = MockChat::new(vec![
        Ok("first reply".to_string()),
        Ok("second reply".to_string()),
    ]);
    let synth = MockSynthesizer::new(Arc::clone(&log));

    let mut orch = orchestrator(
        Arc::clone(&chat),
        Arc::clone(&synth),
        Arc::clone(&log),
        history_in(&dir),
    );

    orch.handle_transcript(transcript("first question", 0)).await;
    // first session is still rendering when the user speaks again
    orch.handle_transcript(transcript("second question", 1)).await;

    assert_eq!(log.count(), 2);
    assert!(log.cancelled(0));
    assert!(!log.cancelled(1));

    // the first session was already cancelled when the second reply was synthesized
    let prior = synth.prior_cancelled.lock().unwrap();
    assert!(prior[1]);

    assert_eq!(orch.history_len(), 4);
}

#[tokio::test]
async fn interrupt_phrase_cancels_without_a_turn() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(SessionLog::default());
    let chat = MockChat::new(vec![Ok("talking now".to_string())]);
    let synth = MockSynthesizer::new(Arc::clone(&log));

    let mut orch = orchestrator(
        Arc::clone(&chat),
        Arc::clone(&synth),
        Arc::clone(&log),
        history_in(&dir),
    );

    orch.handle_transcript(transcript("say something", 0)).await;
    assert_eq!(log.count(), 1);

    orch.handle_transcript(transcript("okay stop please", 1)).await;

    // playback cancelled, no reply generated for the interrupt
    assert!(log.cancelled(0));
    assert_eq!(chat.call_count(), 1);
    assert_eq!(log.count(), 1);
    assert_eq!(orch.history_len(), 2);
}

#[tokio::test]
async fn interrupt_with_nothing_playing_is_a_normal_turn() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(SessionLog::default());
    let chat = MockChat::new(vec![Ok("I wasn't saying anything".to_string())]);
    let synth = MockSynthesizer::new(Arc::clone(&log));

    let mut orch = orchestrator(
        Arc::clone(&chat),
        synth,
        Arc::clone(&log),
        history_in(&dir),
    );

    // "quiet" only acts as an interrupt while a reply is playing
    orch.handle_transcript(transcript("quiet", 0)).await;

    assert_eq!(chat.call_count(), 1);
    assert_eq!(log.count(), 1);
    assert_eq!(orch.history_len(), 2);
}

#[tokio::test]
async fn synthesis_failure_still_records_the_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(SessionLog::default());
    let chat = MockChat::new(vec![Ok("a reply".to_string())]);
    let synth = MockSynthesizer::failing(Arc::clone(&log));

    let mut orch = orchestrator(
        Arc::clone(&chat),
        synth,
        Arc::clone(&log),
        history_in(&dir),
    );

    orch.handle_transcript(transcript("hello", 0)).await;

    // no playback session, but the exchange survives in history
    assert_eq!(log.count(), 0);
    assert_eq!(orch.history_len(), 2);
}

#[tokio::test]
async fn chat_failure_abandons_the_turn() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(SessionLog::default());
    let chat = MockChat::new(vec![Err(Error::Llm("model offline".to_string()))]);
    let synth = MockSynthesizer::new(Arc::clone(&log));

    let mut orch = orchestrator(
        Arc::clone(&chat),
        Arc::clone(&synth),
        Arc::clone(&log),
        history_in(&dir),
    );

    orch.handle_transcript(transcript("hello", 0)).await;

    assert_eq!(chat.call_count(), 1);
    assert!(synth.calls.lock().unwrap().is_empty());
    assert_eq!(orch.history_len(), 0);
}

#[tokio::test]
async fn run_drains_queue_and_exits_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(SessionLog::default());
    let chat = MockChat::new(vec![Ok("one".to_string()), Ok("two".to_string())]);
    let synth = MockSynthesizer::new(Arc::clone(&log));

    let orch = orchestrator(
        Arc::clone(&chat),
        synth,
        Arc::clone(&log),
        history_in(&dir),
    );

    let (tx, rx) = transcript_channel();
    let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    assert!(tx.send(transcript("first", 0)));
    assert!(tx.send(transcript("second", 1)));
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), orch.run(rx, shutdown_rx))
        .await
        .expect("orchestrator should exit when the queue closes");

    assert_eq!(chat.call_count(), 2);
    assert_eq!(log.count(), 2);
    // barge-in: the first session was cancelled when the second reply played
    assert!(log.cancelled(0));
}
