//! Configuration management for the voice engine

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::emotion::{EmotionTag, KeywordTable};
use crate::vad::SegmenterConfig;
use crate::{Error, Result};

/// Engine configuration, resolved env > file > default
#[derive(Debug, Clone)]
pub struct Config {
    /// Capture and segmentation parameters
    pub audio: AudioConfig,

    /// Backend endpoints
    pub backends: BackendsConfig,

    /// Character voice and prompt
    pub character: CharacterConfig,

    /// Conversation history
    pub history: HistoryConfig,

    /// Emotion classification tables
    pub emotion: KeywordTable,
}

/// Capture and segmentation parameters
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Capture frame duration
    pub frame_duration: Duration,

    /// RMS energy above which a frame counts as speech
    pub silence_threshold: f32,

    /// Minimum accumulated speech for a segment to be forwarded
    pub min_speech_duration: Duration,

    /// Trailing silence that closes an open segment
    pub max_silence_duration: Duration,
}

impl AudioConfig {
    /// Capture frame size in samples
    #[must_use]
    pub fn frame_samples(&self) -> usize {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let samples =
            (f64::from(self.sample_rate) * self.frame_duration.as_secs_f64()) as usize;
        samples.max(1)
    }

    /// Segmenter tuning derived from these parameters
    #[must_use]
    pub const fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            sample_rate: self.sample_rate,
            silence_threshold: self.silence_threshold,
            min_speech_duration: self.min_speech_duration,
            max_silence_duration: self.max_silence_duration,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_duration: Duration::from_millis(100),
            silence_threshold: 0.01,
            min_speech_duration: Duration::from_secs(1),
            max_silence_duration: Duration::from_secs(2),
        }
    }
}

/// Backend endpoints
#[derive(Debug, Clone)]
pub struct BackendsConfig {
    /// Transcription server base URL (whisper-compatible)
    pub stt_url: String,

    /// Language backend base URL (Ollama-compatible)
    pub llm_url: String,

    /// Synthesis server base URL (GPT-SoVITS-compatible)
    pub tts_url: String,

    /// Language model identifier
    pub llm_model: String,
}

/// Character voice and prompt
#[derive(Debug, Clone)]
pub struct CharacterConfig {
    /// Character name used in logs and history
    pub name: String,

    /// System prompt establishing the character
    pub system_prompt: String,

    /// Reference audio path on the synthesis server
    pub ref_audio_path: String,

    /// Transcript of the reference audio
    pub prompt_text: String,

    /// Language of the reference audio
    pub prompt_lang: String,

    /// Language of synthesized text
    pub text_lang: String,

    /// Phrases that cancel playback instead of becoming a turn
    pub interrupt_phrases: Vec<String>,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            name: "aria".to_string(),
            system_prompt: "You are Aria, a playful anime character. Keep replies \
                            short and conversational, as they will be spoken aloud."
                .to_string(),
            ref_audio_path: String::new(),
            prompt_text: String::new(),
            prompt_lang: "en".to_string(),
            text_lang: "en".to_string(),
            interrupt_phrases: ["stop", "quiet", "silence", "shut up"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Conversation history
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// History file path (JSON lines)
    pub path: PathBuf,

    /// Number of recent turns sent to the language backend
    pub context_window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            context_window: 10,
        }
    }
}

/// Default history path: `~/.local/share/aria/history.jsonl`
fn default_history_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("history.jsonl"),
        |d| d.data_dir().join("aria").join("history.jsonl"),
    )
}

impl Config {
    /// Load configuration, layering env > file > default
    ///
    /// # Errors
    ///
    /// Returns error if a required backend endpoint is missing from both the
    /// environment and the config file, or if the audio parameters are
    /// unusable (zero sample rate or frame duration).
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = file::config_file_path(config_path);
        let fc = file::load_config_file(&path);

        let defaults = AudioConfig::default();
        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(defaults.sample_rate),
            frame_duration: fc
                .audio
                .frame_ms
                .map_or(defaults.frame_duration, Duration::from_millis),
            silence_threshold: fc
                .audio
                .silence_threshold
                .unwrap_or(defaults.silence_threshold),
            min_speech_duration: fc
                .audio
                .min_speech_ms
                .map_or(defaults.min_speech_duration, Duration::from_millis),
            max_silence_duration: fc
                .audio
                .max_silence_ms
                .map_or(defaults.max_silence_duration, Duration::from_millis),
        };
        validate_audio(&audio)?;

        let backends = BackendsConfig {
            stt_url: require_endpoint("stt", "ARIA_STT_URL", fc.backends.stt_url)?,
            llm_url: require_endpoint("llm", "ARIA_LLM_URL", fc.backends.llm_url)?,
            tts_url: require_endpoint("tts", "ARIA_TTS_URL", fc.backends.tts_url)?,
            llm_model: std::env::var("ARIA_LLM_MODEL")
                .ok()
                .or(fc.backends.llm_model)
                .unwrap_or_else(|| "qwen2.5".to_string()),
        };

        let character_defaults = CharacterConfig::default();
        let character = CharacterConfig {
            name: fc.character.name.unwrap_or(character_defaults.name),
            system_prompt: fc
                .character
                .system_prompt
                .unwrap_or(character_defaults.system_prompt),
            ref_audio_path: fc
                .character
                .ref_audio_path
                .unwrap_or(character_defaults.ref_audio_path),
            prompt_text: fc
                .character
                .prompt_text
                .unwrap_or(character_defaults.prompt_text),
            prompt_lang: fc
                .character
                .prompt_lang
                .unwrap_or(character_defaults.prompt_lang),
            text_lang: fc
                .character
                .text_lang
                .unwrap_or(character_defaults.text_lang),
            interrupt_phrases: fc
                .character
                .interrupt_phrases
                .unwrap_or(character_defaults.interrupt_phrases),
        };

        let history_defaults = HistoryConfig::default();
        let history = HistoryConfig {
            path: std::env::var("ARIA_HISTORY_PATH")
                .map(PathBuf::from)
                .ok()
                .or_else(|| fc.history.path.map(PathBuf::from))
                .unwrap_or(history_defaults.path),
            context_window: fc
                .history
                .context_window
                .unwrap_or(history_defaults.context_window),
        };

        let emotion = build_keyword_table(&fc.emotion)?;

        Ok(Self {
            audio,
            backends,
            character,
            history,
            emotion,
        })
    }
}

/// Reject audio parameters the segmenter cannot run on
fn validate_audio(audio: &AudioConfig) -> Result<()> {
    if audio.sample_rate == 0 {
        return Err(Error::Config(
            "[audio] sample_rate must be positive".to_string(),
        ));
    }
    if audio.frame_duration.is_zero() {
        return Err(Error::Config(
            "[audio] frame_ms must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Resolve a required endpoint (env > file), fatal when absent
fn require_endpoint(name: &str, env_var: &str, from_file: Option<String>) -> Result<String> {
    std::env::var(env_var).ok().or(from_file).ok_or_else(|| {
        Error::Config(format!(
            "{name} endpoint not configured: set {env_var} or [backends].{name}_url"
        ))
    })
}

/// Build the keyword table from config overrides on top of the built-in tables
fn build_keyword_table(fc: &file::EmotionFileConfig) -> Result<KeywordTable> {
    let mut table = KeywordTable::default();

    if let Some(name) = &fc.default {
        let tag = EmotionTag::from_name(name)
            .ok_or_else(|| Error::Config(format!("unknown emotion tag: {name}")))?;
        table = table.with_default(tag);
    }

    if let Some(keywords) = &fc.keywords {
        for (name, list) in keywords {
            let tag = EmotionTag::from_name(name)
                .ok_or_else(|| Error::Config(format!("unknown emotion tag: {name}")))?;
            table.set_keywords(tag, list.clone());
        }
    }

    if let Some(expressions) = &fc.expressions {
        let mut resolved = Vec::with_capacity(expressions.len());
        for (expression, name) in expressions {
            let tag = EmotionTag::from_name(name)
                .ok_or_else(|| Error::Config(format!("unknown emotion tag: {name}")))?;
            resolved.push((expression.clone(), tag));
        }
        table.set_expressions(resolved);
    }

    Ok(table)
}
