//! Speech-to-text processing
//!
//! A [`Transcriber`] turns a speech segment into text. The dispatcher pumps
//! finalized segments through it one at a time, in order, and forwards
//! non-blank transcripts to the conversation loop. Blank transcripts and
//! backend failures drop the segment; they never stall the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::samples_to_wav;
use crate::vad::SpeechSegment;
use crate::{Error, Result};

/// Pending-transcript depth past which the dispatcher warns
const QUEUE_WARN_DEPTH: usize = 8;

/// One transcribed utterance, in segment order
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub sequence: u64,
}

/// Transcribes a speech segment to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe mono f32 samples at the given rate
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String>;
}

/// Response from a whisper-compatible transcription server
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes against a whisper-compatible HTTP server
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
}

impl HttpTranscriber {
    /// Create a transcriber for the given server base URL
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/inference", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        let wav = samples_to_wav(samples, sample_rate)?;
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("response_format", "json");

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription server error");
            return Err(Error::Stt(format!("server error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

/// Create a monitored transcript channel
///
/// The channel itself is unbounded; the sender tracks depth and warns when
/// the conversation loop falls behind.
#[must_use]
pub fn transcript_channel() -> (TranscriptSender, TranscriptReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        TranscriptSender {
            tx,
            depth: Arc::clone(&depth),
        },
        TranscriptReceiver { rx, depth },
    )
}

/// Producer side of the transcript queue
#[derive(Clone)]
pub struct TranscriptSender {
    tx: mpsc::UnboundedSender<Transcript>,
    depth: Arc<AtomicUsize>,
}

impl TranscriptSender {
    /// Enqueue a transcript; returns false when the consumer is gone
    #[must_use]
    pub fn send(&self, transcript: Transcript) -> bool {
        if self.tx.send(transcript).is_err() {
            return false;
        }
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth > QUEUE_WARN_DEPTH {
            tracing::warn!(depth, "transcript queue backing up");
        }
        true
    }

    /// Pending transcripts not yet consumed
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Consumer side of the transcript queue
pub struct TranscriptReceiver {
    rx: mpsc::UnboundedReceiver<Transcript>,
    depth: Arc<AtomicUsize>,
}

impl TranscriptReceiver {
    /// Receive the next transcript, `None` when all senders are gone
    pub async fn recv(&mut self) -> Option<Transcript> {
        let transcript = self.rx.recv().await;
        if transcript.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        transcript
    }
}

/// Pumps speech segments through a transcriber, preserving order
///
/// At most one transcription is in flight; segments queue in their channel
/// until the current one completes.
pub struct TranscriptionDispatcher {
    transcriber: Arc<dyn Transcriber>,
    sample_rate: u32,
}

impl TranscriptionDispatcher {
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>, sample_rate: u32) -> Self {
        Self {
            transcriber,
            sample_rate,
        }
    }

    /// Run until the segment channel closes or the consumer goes away
    pub async fn run(
        self,
        mut segments: mpsc::Receiver<SpeechSegment>,
        transcripts: TranscriptSender,
    ) {
        while let Some(segment) = segments.recv().await {
            let sequence = segment.sequence;
            match self
                .transcriber
                .transcribe(&segment.samples, self.sample_rate)
                .await
            {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        tracing::debug!(sequence, "blank transcript dropped");
                        continue;
                    }
                    if !transcripts.send(Transcript { text, sequence }) {
                        tracing::debug!("transcript consumer gone, dispatcher exiting");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(sequence, error = %e, "transcription failed, segment dropped");
                }
            }
        }
        tracing::debug!("segment channel closed, dispatcher exiting");
    }
}
