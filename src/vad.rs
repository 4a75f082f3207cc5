//! Energy-based voice activity segmentation
//!
//! Consumes fixed-size capture frames and cuts them into speech segments.
//! A segment opens when a frame's RMS energy crosses the silence threshold,
//! keeps accumulating through trailing silence (so word-final phonemes are
//! not clipped), and is finalized once the silence tail exceeds the
//! configured maximum, provided enough actual speech was collected.
//! Short noise bursts are discarded by the minimum-duration gate.

use std::time::Duration;

/// One finalized candidate utterance
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    /// Mono f32 PCM, including the trailing silence tail
    pub samples: Vec<f32>,
    /// Monotonic finalization counter, used to verify ordering downstream
    pub sequence: u64,
    /// Accumulated above-threshold duration
    pub speech: Duration,
}

impl SpeechSegment {
    /// Total segment duration at the given sample rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(sample_rate))
    }
}

/// Segmenter tuning, sourced from configuration
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// RMS energy above which a frame counts as speech
    pub silence_threshold: f32,
    /// Minimum accumulated speech for a segment to be forwarded
    pub min_speech_duration: Duration,
    /// Trailing silence that closes an open segment
    pub max_silence_duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Speaking,
}

/// Streaming state machine over capture frames
///
/// `push_frame` is synchronous and O(frame) so it can run on (or adjacent
/// to) the capture context without ever blocking it.
pub struct VoiceActivitySegmenter {
    config: SegmenterConfig,
    state: State,
    buffer: Vec<f32>,
    speech: Duration,
    trailing_silence: Duration,
    next_sequence: u64,
}

impl VoiceActivitySegmenter {
    #[must_use]
    pub const fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            buffer: Vec::new(),
            speech: Duration::ZERO,
            trailing_silence: Duration::ZERO,
            next_sequence: 0,
        }
    }

    /// Feed one capture frame; returns a segment when one finalizes
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn push_frame(&mut self, frame: &[f32]) -> Option<SpeechSegment> {
        let energy = rms_energy(frame);
        let is_speech = energy > self.config.silence_threshold;
        let frame_duration =
            Duration::from_secs_f64(frame.len() as f64 / f64::from(self.config.sample_rate));

        match self.state {
            State::Idle => {
                if is_speech {
                    tracing::trace!(energy, "speech onset");
                    self.state = State::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(frame);
                    self.speech = frame_duration;
                    self.trailing_silence = Duration::ZERO;
                }
                None
            }
            State::Speaking => {
                self.buffer.extend_from_slice(frame);
                if is_speech {
                    self.speech += frame_duration;
                    self.trailing_silence = Duration::ZERO;
                } else {
                    self.trailing_silence += frame_duration;
                }

                if self.trailing_silence <= self.config.max_silence_duration {
                    return None;
                }

                let samples = std::mem::take(&mut self.buffer);
                let speech = self.speech;
                self.reset();

                if speech >= self.config.min_speech_duration {
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;
                    tracing::debug!(
                        sequence,
                        samples = samples.len(),
                        speech_ms = speech.as_millis() as u64,
                        "segment finalized"
                    );
                    Some(SpeechSegment {
                        samples,
                        sequence,
                        speech,
                    })
                } else {
                    tracing::trace!(
                        speech_ms = speech.as_millis() as u64,
                        "segment below minimum speech duration, discarded"
                    );
                    None
                }
            }
        }
    }

    /// Whether a segment is currently open
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == State::Speaking
    }

    fn reset(&mut self) {
        self.state = State::Idle;
        self.speech = Duration::ZERO;
        self.trailing_silence = Duration::ZERO;
    }
}

/// RMS energy of a frame of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
