//! Engine wiring and the conversation loop
//!
//! The engine owns the pipeline: capture frames feed the segmenter task,
//! finalized segments feed the transcription dispatcher, and transcripts
//! feed the orchestrator, which generates, synthesizes, and plays replies.
//! Each stage hands off through a channel, so a slow backend never blocks
//! capture.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::{AudioCaptureStream, CpalSink, PlaybackController};
use crate::config::Config;
use crate::emotion::{KeywordTable, classify};
use crate::history::ConversationHistory;
use crate::llm::{ChatBackend, OllamaChat};
use crate::stt::{
    HttpTranscriber, Transcript, TranscriptReceiver, TranscriptionDispatcher, transcript_channel,
};
use crate::tts::{SovitsSynthesizer, Synthesizer};
use crate::vad::{SpeechSegment, VoiceActivitySegmenter};
use crate::Result;

/// Capture frame backlog before frames are dropped (~3s at 100ms frames)
const FRAME_CHANNEL_CAPACITY: usize = 32;

/// Finalized segments awaiting transcription
const SEGMENT_CHANNEL_CAPACITY: usize = 8;

/// The voice engine: builds the pipeline and runs it until interrupted
pub struct Engine {
    config: Config,
}

impl Engine {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the engine until ctrl-c
    ///
    /// # Errors
    ///
    /// Returns error if audio devices or backends cannot be initialized
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        let (frame_tx, frame_rx) = mpsc::channel::<Vec<f32>>(FRAME_CHANNEL_CAPACITY);
        let (segment_tx, segment_rx) = mpsc::channel::<SpeechSegment>(SEGMENT_CHANNEL_CAPACITY);
        let (transcript_tx, transcript_rx) = transcript_channel();

        let mut capture = AudioCaptureStream::new(&config.audio)?;

        let segmenter = VoiceActivitySegmenter::new(config.audio.segmenter());
        tokio::spawn(run_segmenter(frame_rx, segmenter, segment_tx));

        let transcriber = Arc::new(HttpTranscriber::new(&config.backends.stt_url));
        let dispatcher = TranscriptionDispatcher::new(transcriber, config.audio.sample_rate);
        tokio::spawn(dispatcher.run(segment_rx, transcript_tx));

        let chat: Arc<dyn ChatBackend> = Arc::new(OllamaChat::new(
            &config.backends.llm_url,
            config.backends.llm_model.clone(),
            config.character.system_prompt.clone(),
        )?);
        let synthesizer: Arc<dyn Synthesizer> = Arc::new(SovitsSynthesizer::new(
            &config.backends.tts_url,
            config.character.clone(),
        ));
        let playback = PlaybackController::new(Arc::new(CpalSink::new()?));
        let history = ConversationHistory::load(&config.history);

        let orchestrator = ConversationOrchestrator::new(
            chat,
            synthesizer,
            playback,
            history,
            config.emotion.clone(),
            config.character.interrupt_phrases.clone(),
        );

        // Set up shutdown signal
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        capture.start(frame_tx)?;
        tracing::info!(
            character = %config.character.name,
            sample_rate = config.audio.sample_rate,
            "engine listening"
        );

        orchestrator.run(transcript_rx, shutdown_rx).await;

        capture.stop();
        tracing::info!("engine stopped");
        Ok(())
    }
}

/// Pump capture frames through the segmenter
async fn run_segmenter(
    mut frames: mpsc::Receiver<Vec<f32>>,
    mut segmenter: VoiceActivitySegmenter,
    segments: mpsc::Sender<SpeechSegment>,
) {
    while let Some(frame) = frames.recv().await {
        if let Some(segment) = segmenter.push_frame(&frame) {
            if segments.send(segment).await.is_err() {
                tracing::debug!("segment consumer gone, segmenter exiting");
                return;
            }
        }
    }
    tracing::debug!("frame channel closed, segmenter exiting");
}

/// Drives conversation turns from transcripts
///
/// Single consumer of the transcript queue. While a reply is playing, an
/// interrupt phrase cancels it without becoming a turn; any other transcript
/// becomes a turn: reply, emotion tag, synthesis, playback, history. Backend
/// failures abandon the turn and the loop keeps listening.
pub struct ConversationOrchestrator {
    chat: Arc<dyn ChatBackend>,
    synthesizer: Arc<dyn Synthesizer>,
    playback: PlaybackController,
    history: ConversationHistory,
    emotion_table: KeywordTable,
    interrupt_phrases: Vec<String>,
}

impl ConversationOrchestrator {
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        synthesizer: Arc<dyn Synthesizer>,
        playback: PlaybackController,
        history: ConversationHistory,
        emotion_table: KeywordTable,
        interrupt_phrases: Vec<String>,
    ) -> Self {
        Self {
            chat,
            synthesizer,
            playback,
            history,
            emotion_table,
            interrupt_phrases: interrupt_phrases
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Run until shutdown is signalled or the transcript queue closes
    pub async fn run(
        mut self,
        mut transcripts: TranscriptReceiver,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                transcript = transcripts.recv() => {
                    let Some(transcript) = transcript else {
                        tracing::debug!("transcript queue closed");
                        break;
                    };
                    self.handle_transcript(transcript).await;
                }
            }
        }

        self.playback.cancel_active().await;
    }

    /// Process one transcript end to end
    pub async fn handle_transcript(&mut self, transcript: Transcript) {
        let text = transcript.text.as_str();
        tracing::info!(sequence = transcript.sequence, text = %text, "heard");

        if self.playback.is_active() {
            if self.is_interrupt(text) {
                tracing::info!("interrupt phrase, cancelling playback");
                self.playback.cancel_active().await;
                return;
            }
            // Barge-in: the user spoke over the reply, stop it before answering
            tracing::debug!("barge-in, cancelling playback before reply");
            self.playback.cancel_active().await;
        }

        let reply = match self.chat.reply(text, self.history.context()).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "reply generation failed, turn abandoned");
                return;
            }
        };

        let emotion = classify(&reply, &self.emotion_table);
        tracing::debug!(emotion = %emotion, "reply classified");

        match self.synthesizer.synthesize(&reply, emotion).await {
            Ok(audio) => {
                if let Err(e) = self.playback.play(&audio).await {
                    tracing::warn!(error = %e, "playback failed, reply kept in history");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed, reply kept in history");
            }
        }

        if let Err(e) = self.history.record_exchange(text, &reply, emotion) {
            tracing::warn!(error = %e, "failed to persist exchange");
        }
    }

    /// Whether the utterance is a playback-cancel command
    fn is_interrupt(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.interrupt_phrases
            .iter()
            .any(|phrase| lower.contains(phrase))
    }

    /// Turns recorded so far
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
