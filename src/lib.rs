//! Aria Engine - Real-time voice interaction for synthetic characters
//!
//! This library provides the core functionality for the engine:
//! - Continuous audio capture and energy-based speech segmentation
//! - Ordered transcription dispatch against a whisper-compatible server
//! - Emotion-tagged reply generation with bounded conversation context
//! - Voice-cloned synthesis and cancellable playback (barge-in aware)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Microphone                        │
//! │        capture callback → bounded frame channel      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Segmenter  │  Dispatcher  │  Orchestrator         │
//! │   VAD frames → speech segments → transcripts → turns │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              External backends                       │
//! │   STT (whisper)  │  LLM (Ollama)  │  TTS (SoVITS)   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod emotion;
pub mod engine;
pub mod error;
pub mod history;
pub mod llm;
pub mod stt;
pub mod tts;
pub mod vad;

pub use audio::{
    AudioCaptureStream, AudioSink, CpalSink, PlaybackController, PlaybackHandle, decode_audio,
    samples_to_wav,
};
pub use config::{AudioConfig, BackendsConfig, CharacterConfig, Config, HistoryConfig};
pub use emotion::{EmotionTag, KeywordTable, classify};
pub use engine::{ConversationOrchestrator, Engine};
pub use error::{Error, Result};
pub use history::{ConversationHistory, ConversationTurn, Role};
pub use llm::{ChatBackend, OllamaChat};
pub use stt::{
    HttpTranscriber, Transcriber, Transcript, TranscriptReceiver, TranscriptSender,
    TranscriptionDispatcher, transcript_channel,
};
pub use tts::{Prosody, SovitsSynthesizer, Synthesizer, prosody_for};
pub use vad::{SegmenterConfig, SpeechSegment, VoiceActivitySegmenter, rms_energy};
