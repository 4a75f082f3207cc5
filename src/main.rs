use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use aria_engine::audio::{AudioCaptureStream, AudioSink, CpalSink, PlaybackController};
use aria_engine::config::AudioConfig;
use aria_engine::emotion::classify;
use aria_engine::tts::{SovitsSynthesizer, Synthesizer};
use aria_engine::{Config, Engine, PlaybackHandle, rms_energy};

/// Aria - Real-time voice interaction engine for synthetic characters
#[derive(Parser)]
#[command(name = "aria", version, about)]
struct Cli {
    /// Path to config file (default: aria.toml or ~/.config/aria/config.toml)
    #[arg(short, long, env = "ARIA_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,aria_engine=info",
        1 => "info,aria_engine=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(config_path, &text).await,
        };
    }

    let config = Config::load(config_path)?;
    tracing::info!(character = %config.character.name, "starting aria engine");

    Engine::new(config).run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let audio = AudioConfig::default();
    let mut capture = AudioCaptureStream::new(&audio)?;
    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<f32>>(64);
    capture.start(frame_tx)?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        let mut samples = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, frame_rx.recv()).await {
                Ok(Some(frame)) => samples.extend(frame),
                Ok(None) | Err(_) => break,
            }
        }

        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new()?;

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24_000u32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let handle = PlaybackHandle::new();
    sink.start(samples, sample_rate, handle.clone())?;
    while !handle.is_done() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output against the configured synthesis server
#[allow(clippy::future_not_send)]
async fn test_tts(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let synthesizer = SovitsSynthesizer::new(&config.backends.tts_url, config.character.clone());

    let emotion = classify(text, &config.emotion);
    println!("Classified emotion: {emotion}");

    println!("Synthesizing speech...");
    let audio = synthesizer.synthesize(text, emotion).await?;
    println!("Got {} bytes of audio data", audio.len());

    if audio.len() > 3 {
        println!(
            "First 4 bytes: {:02x} {:02x} {:02x} {:02x}",
            audio[0], audio[1], audio[2], audio[3]
        );
    }

    println!("Playing audio...");
    let mut playback = PlaybackController::new(Arc::new(CpalSink::new()?));
    playback.play(&audio).await?;
    while playback.is_active() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
