//! Audio playback to speakers
//!
//! A reply plays through an [`AudioSink`] on its own render thread. The
//! controller guarantees at most one active session: starting a new reply
//! first cancels the running one and waits a bounded time for the sink to
//! wind down, force-marking the session done if it doesn't.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Render thread poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a cancel waits for the sink before forcing the session done
const CANCEL_WAIT: Duration = Duration::from_millis(200);

/// Shared cancel/done flags for one playback session
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    cancel: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

impl PlaybackHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request the render thread to stop
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Mark the session finished (render thread, or forced by the controller)
    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Default for PlaybackHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders mono f32 samples, observing the session's cancel flag
///
/// `start` must not block: implementations hand the samples to their own
/// render context and return. The sink marks the handle done when rendering
/// finishes or the cancel flag is observed.
pub trait AudioSink: Send + Sync {
    /// Begin rendering a session
    ///
    /// # Errors
    ///
    /// Returns error if rendering cannot be started
    fn start(&self, samples: Vec<f32>, sample_rate: u32, handle: PlaybackHandle) -> Result<()>;
}

/// Renders through the default cpal output device
pub struct CpalSink;

impl CpalSink {
    /// Create a sink, verifying an output device exists
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self)
    }

    /// Negotiate an output config at the requested rate, mono preferred
    fn negotiate(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        Ok(supported.with_sample_rate(SampleRate(sample_rate)).config())
    }

    /// Render loop body, run on the dedicated playback thread
    fn render(samples: Vec<f32>, sample_rate: u32, handle: &PlaybackHandle) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let config = Self::negotiate(&device, sample_rate)?;
        let channels = config.channels as usize;

        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let samples_cb = Arc::clone(&samples);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position_cb.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = if pos < samples_cb.len() {
                            let s = samples_cb[pos];
                            pos += 1;
                            s
                        } else {
                            finished_cb.store(true, Ordering::Release);
                            0.0
                        };
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                    position_cb.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Upper bound on how long the session may run
        let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate);
        let deadline = std::time::Instant::now() + Duration::from_millis(duration_ms + 500);

        let mut cancelled = false;
        while !finished.load(Ordering::Acquire) {
            if handle.is_cancelled() {
                cancelled = true;
                break;
            }
            if std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        drop(stream);

        if cancelled {
            tracing::debug!(
                rendered = position.load(Ordering::Relaxed),
                total = sample_count,
                "playback cancelled"
            );
        } else {
            // Let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
            tracing::debug!(samples = sample_count, "playback complete");
        }

        Ok(())
    }
}

impl AudioSink for CpalSink {
    fn start(&self, samples: Vec<f32>, sample_rate: u32, handle: PlaybackHandle) -> Result<()> {
        // The stream must be built on the thread that owns it
        std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                if let Err(e) = Self::render(samples, sample_rate, &handle) {
                    tracing::error!(error = %e, "playback render failed");
                }
                handle.mark_done();
            })
            .map_err(|e| Error::Playback(e.to_string()))?;

        Ok(())
    }
}

/// Enforces at-most-one playback session over an [`AudioSink`]
pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    current: Option<PlaybackHandle>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            current: None,
        }
    }

    /// Whether a session is currently rendering
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_done())
    }

    /// Cancel the active session, if any, and wait for it to wind down
    ///
    /// The wait is bounded: if the sink has not acknowledged within
    /// [`CANCEL_WAIT`], the session is force-marked done and dropped.
    pub async fn cancel_active(&mut self) {
        let Some(handle) = self.current.take() else {
            return;
        };
        if handle.is_done() {
            return;
        }

        handle.cancel();

        let deadline = tokio::time::Instant::now() + CANCEL_WAIT;
        while !handle.is_done() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("playback did not stop in time, forcing session done");
                handle.mark_done();
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Decode and play a reply, cancelling any session still running
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded or the sink fails to
    /// start
    pub async fn play(&mut self, audio: &[u8]) -> Result<()> {
        let (samples, sample_rate) = decode_audio(audio)?;
        if samples.is_empty() {
            return Ok(());
        }

        self.cancel_active().await;

        let handle = PlaybackHandle::new();
        self.sink
            .start(samples, sample_rate, handle.clone())?;
        self.current = Some(handle);

        Ok(())
    }
}

/// Decode reply audio to mono f32 samples plus its sample rate
///
/// WAV is detected by the RIFF header; anything else is treated as MP3.
///
/// # Errors
///
/// Returns error if the bytes decode as neither
pub fn decode_audio(audio: &[u8]) -> Result<(Vec<f32>, u32)> {
    if audio.starts_with(b"RIFF") {
        decode_wav(audio)
    } else {
        decode_mp3(audio)
    }
}

/// Decode WAV bytes, folding multi-channel audio to mono
#[allow(clippy::cast_precision_loss)]
fn decode_wav(audio: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(audio)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max = f32::from(i16::MAX);
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| f32::from(v) / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(audio: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(audio));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    #[allow(clippy::cast_sign_loss)]
                    {
                        sample_rate = frame.sample_rate.max(0) as u32;
                    }
                }

                // Convert i16 samples to f32 and handle stereo to mono
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    // Stereo: average channels
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        })
                        .collect()
                } else {
                    // Mono
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no decodable audio frames".to_string()));
    }

    Ok((samples, sample_rate))
}
