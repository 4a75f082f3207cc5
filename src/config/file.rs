//! TOML configuration file loading
//!
//! Supports `aria.toml` (or `~/.config/aria/config.toml`) as a persistent
//! config source. All fields are optional, the file is a partial overlay on
//! top of defaults. Unknown keys are ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AriaConfigFile {
    /// Capture and segmentation configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Backend endpoint configuration
    #[serde(default)]
    pub backends: BackendsFileConfig,

    /// Character voice and prompt configuration
    #[serde(default)]
    pub character: CharacterFileConfig,

    /// Conversation history configuration
    #[serde(default)]
    pub history: HistoryFileConfig,

    /// Emotion classification overrides
    #[serde(default)]
    pub emotion: EmotionFileConfig,
}

/// Capture and segmentation configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Capture frame size in milliseconds
    pub frame_ms: Option<u64>,

    /// RMS energy above which a frame counts as speech
    pub silence_threshold: Option<f32>,

    /// Minimum accumulated speech in milliseconds for a segment to count
    pub min_speech_ms: Option<u64>,

    /// Trailing silence in milliseconds that closes a segment
    pub max_silence_ms: Option<u64>,
}

/// Backend endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendsFileConfig {
    /// Transcription server base URL (whisper-compatible)
    pub stt_url: Option<String>,

    /// Language backend base URL (Ollama-compatible)
    pub llm_url: Option<String>,

    /// Synthesis server base URL (GPT-SoVITS-compatible)
    pub tts_url: Option<String>,

    /// Language model identifier
    pub llm_model: Option<String>,
}

/// Character voice and prompt configuration
#[derive(Debug, Default, Deserialize)]
pub struct CharacterFileConfig {
    /// Character name used in logs and history
    pub name: Option<String>,

    /// System prompt establishing the character
    pub system_prompt: Option<String>,

    /// Reference audio path on the synthesis server
    pub ref_audio_path: Option<String>,

    /// Transcript of the reference audio
    pub prompt_text: Option<String>,

    /// Language of the reference audio (e.g. "en")
    pub prompt_lang: Option<String>,

    /// Language of synthesized text
    pub text_lang: Option<String>,

    /// Phrases that cancel playback instead of becoming a turn
    pub interrupt_phrases: Option<Vec<String>>,
}

/// Conversation history configuration
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFileConfig {
    /// History file path (JSON lines)
    pub path: Option<String>,

    /// Number of recent turns sent to the language backend
    pub context_window: Option<usize>,
}

/// Emotion classification overrides
#[derive(Debug, Default, Deserialize)]
pub struct EmotionFileConfig {
    /// Default tag when no signal fires (e.g. "neutral")
    pub default: Option<String>,

    /// Per-tag keyword list overrides, keyed by tag name
    pub keywords: Option<HashMap<String, Vec<String>>>,

    /// Expression table override, expression -> tag name
    pub expressions: Option<HashMap<String, String>>,
}

/// Load the TOML config file from the given path
///
/// Returns `AriaConfigFile::default()` if the file doesn't exist or can't be
/// parsed; a broken file never prevents startup.
pub fn load_config_file(path: &Path) -> AriaConfigFile {
    if !path.exists() {
        return AriaConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AriaConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AriaConfigFile::default()
        }
    }
}

/// Resolve the config file path: explicit > `ARIA_CONFIG` > `./aria.toml` >
/// `~/.config/aria/config.toml`
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var("ARIA_CONFIG") {
        return PathBuf::from(path);
    }

    let local = PathBuf::from("aria.toml");
    if local.exists() {
        return local;
    }

    directories::BaseDirs::new().map_or(local, |d| {
        d.config_dir().join("aria").join("config.toml")
    })
}
