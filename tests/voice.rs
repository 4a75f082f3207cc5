//! Voice pipeline integration tests
//!
//! Tests segmentation and audio conversion without requiring audio hardware

use std::io::Cursor;
use std::time::Duration;

use aria_engine::{SegmenterConfig, VoiceActivitySegmenter, samples_to_wav};

mod common;
use common::{SAMPLE_RATE, generate_silence, generate_sine_samples};

/// 100ms capture frames at 16kHz
const FRAME: usize = 1600;

fn segmenter() -> VoiceActivitySegmenter {
    VoiceActivitySegmenter::new(SegmenterConfig {
        sample_rate: SAMPLE_RATE,
        silence_threshold: 0.01,
        min_speech_duration: Duration::from_secs(1),
        max_silence_duration: Duration::from_secs(2),
    })
}

/// Feed samples frame by frame, collecting any finalized segments
fn feed(
    seg: &mut VoiceActivitySegmenter,
    samples: &[f32],
) -> Vec<aria_engine::SpeechSegment> {
    samples
        .chunks(FRAME)
        .filter(|frame| frame.len() == FRAME)
        .filter_map(|frame| seg.push_frame(frame))
        .collect()
}

#[test]
fn test_silence_never_finalizes() {
    let mut seg = segmenter();
    let finalized = feed(&mut seg, &generate_silence(10.0));
    assert!(finalized.is_empty());
    assert!(!seg.is_speaking());
}

#[test]
fn test_utterance_finalizes_after_silence_tail() {
    let mut seg = segmenter();

    let mut audio = generate_sine_samples(440.0, 1.5, 0.3);
    audio.extend(generate_silence(2.5));

    let finalized = feed(&mut seg, &audio);
    assert_eq!(finalized.len(), 1);

    let segment = &finalized[0];
    assert_eq!(segment.sequence, 0);
    // speech plus the silence tail that closed the segment
    assert!(segment.duration(SAMPLE_RATE) > Duration::from_millis(3400));
    assert!(segment.speech >= Duration::from_millis(1400));
}

#[test]
fn test_short_burst_is_discarded() {
    let mut seg = segmenter();

    let mut audio = generate_sine_samples(440.0, 0.2, 0.3);
    audio.extend(generate_silence(3.0));

    let finalized = feed(&mut seg, &audio);
    assert!(finalized.is_empty());
    assert!(!seg.is_speaking());
}

#[test]
fn test_consecutive_utterances_are_ordered() {
    let mut seg = segmenter();

    let mut audio = Vec::new();
    for _ in 0..3 {
        audio.extend(generate_sine_samples(440.0, 1.2, 0.3));
        audio.extend(generate_silence(2.5));
    }

    let finalized = feed(&mut seg, &audio);
    let sequences: Vec<u64> = finalized.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

#[test]
fn test_mid_utterance_pause_does_not_split() {
    let mut seg = segmenter();

    // 1.9s pause is below the 2s boundary, so both halves are one segment
    let mut audio = generate_sine_samples(440.0, 1.0, 0.3);
    audio.extend(generate_silence(1.9));
    audio.extend(generate_sine_samples(440.0, 1.0, 0.3));
    audio.extend(generate_silence(2.5));

    let finalized = feed(&mut seg, &audio);
    assert_eq!(finalized.len(), 1);
    assert!(finalized[0].speech >= Duration::from_millis(1800));
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV should have reasonable size
    assert!(wav_data.len() > 44); // WAV header is 44 bytes
}

#[test]
fn test_wav_roundtrip() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    // Read WAV back
    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);

    // Read samples back
    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), original_samples.len());
}

#[test]
fn test_segment_wav_is_transcribable_shape() {
    let mut seg = segmenter();

    let mut audio = generate_sine_samples(300.0, 1.2, 0.2);
    audio.extend(generate_silence(2.5));
    let finalized = feed(&mut seg, &audio);

    let wav = samples_to_wav(&finalized[0].samples, SAMPLE_RATE).unwrap();
    assert_eq!(wav.len(), 44 + finalized[0].samples.len() * 2);
}
