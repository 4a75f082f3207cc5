//! Audio capture from microphone
//!
//! The device callback slices incoming samples into fixed-size frames and
//! hands them to a bounded channel with `try_send`. The callback never
//! blocks: when the consumer falls behind, frames are dropped and counted
//! instead of stalling the audio thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::config::AudioConfig;
use crate::{Error, Result};

/// Captures audio from the default input device
pub struct AudioCaptureStream {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    frame_samples: usize,
    dropped: Arc<AtomicU64>,
    stream: Option<Stream>,
}

impl AudioCaptureStream {
    /// Create a new capture instance for the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no input device supports mono capture at the
    /// configured sample rate
    pub fn new(audio: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let sample_rate = audio.sample_rate;
        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            frame_samples: audio.frame_samples(),
            dropped: Arc::new(AtomicU64::new(0)),
            stream: None,
        })
    }

    /// Start capturing, delivering frames into the given channel
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let config = self.config.clone();
        let frame_samples = self.frame_samples;
        let dropped = Arc::clone(&self.dropped);

        // Partial frame carried across callbacks
        let mut pending: Vec<f32> = Vec::with_capacity(frame_samples * 2);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pending.extend_from_slice(data);
                    while pending.len() >= frame_samples {
                        let frame: Vec<f32> = pending.drain(..frame_samples).collect();
                        if frames.try_send(frame).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(frame_samples = self.frame_samples, "audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            let dropped = self.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                tracing::warn!(dropped, "frames dropped during capture");
            }
            tracing::debug!("audio capture stopped");
        }
    }

    /// Frames dropped because the consumer fell behind
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Convert f32 samples to WAV bytes for transcription APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
