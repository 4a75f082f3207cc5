//! Speech synthesis
//!
//! Replies are synthesized with a cloned reference voice; the emotion tag
//! picked during classification maps to a prosody adjustment sent along with
//! the request.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::CharacterConfig;
use crate::emotion::EmotionTag;
use crate::{Error, Result};

/// Synthesizes reply text into playable audio bytes
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with the prosody of `emotion`
    ///
    /// Returns encoded audio (WAV or MP3) ready for the playback decoder.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str, emotion: EmotionTag) -> Result<Vec<u8>>;
}

/// Prosody adjustment applied for one emotion
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prosody {
    pub speed: f32,
    pub pitch: f32,
    pub energy: f32,
}

/// Prosody adjustment for an emotion tag
#[must_use]
pub const fn prosody_for(emotion: EmotionTag) -> Prosody {
    match emotion {
        EmotionTag::Happy => Prosody {
            speed: 1.1,
            pitch: 1.05,
            energy: 1.1,
        },
        EmotionTag::Sad => Prosody {
            speed: 0.9,
            pitch: 0.95,
            energy: 0.85,
        },
        EmotionTag::Angry => Prosody {
            speed: 1.15,
            pitch: 1.1,
            energy: 1.2,
        },
        EmotionTag::Surprised => Prosody {
            speed: 1.2,
            pitch: 1.15,
            energy: 1.1,
        },
        EmotionTag::Sleepy => Prosody {
            speed: 0.8,
            pitch: 0.9,
            energy: 0.8,
        },
        EmotionTag::Flirty => Prosody {
            speed: 0.95,
            pitch: 1.05,
            energy: 1.0,
        },
        EmotionTag::Tsundere => Prosody {
            speed: 1.05,
            pitch: 1.1,
            energy: 1.05,
        },
        EmotionTag::Neutral => Prosody {
            speed: 1.0,
            pitch: 1.0,
            energy: 1.0,
        },
    }
}

/// Synthesis request for a GPT-SoVITS-compatible server
#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    text_lang: &'a str,
    ref_audio_path: &'a str,
    prompt_text: &'a str,
    prompt_lang: &'a str,
    speed: f32,
    pitch: f32,
    energy: f32,
}

/// Synthesizer speaking to a GPT-SoVITS-compatible voice cloning server
pub struct SovitsSynthesizer {
    client: reqwest::Client,
    url: String,
    character: CharacterConfig,
}

impl SovitsSynthesizer {
    /// Create a synthesizer for the given server base URL
    #[must_use]
    pub fn new(base_url: &str, character: CharacterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/tts", base_url.trim_end_matches('/')),
            character,
        }
    }
}

#[async_trait]
impl Synthesizer for SovitsSynthesizer {
    async fn synthesize(&self, text: &str, emotion: EmotionTag) -> Result<Vec<u8>> {
        let prosody = prosody_for(emotion);
        let request = SynthesisRequest {
            text,
            text_lang: &self.character.text_lang,
            ref_audio_path: &self.character.ref_audio_path,
            prompt_text: &self.character.prompt_text,
            prompt_lang: &self.character.prompt_lang,
            speed: prosody.speed,
            pitch: prosody.pitch,
            energy: prosody.energy,
        };

        tracing::debug!(
            emotion = %emotion,
            chars = text.len(),
            "starting synthesis"
        );

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "synthesis request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "synthesis server error");
            return Err(Error::Tts(format!("server error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_prosody_is_identity() {
        let p = prosody_for(EmotionTag::Neutral);
        assert!((p.speed - 1.0).abs() < f32::EPSILON);
        assert!((p.pitch - 1.0).abs() < f32::EPSILON);
        assert!((p.energy - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn sleepy_is_slower_than_surprised() {
        assert!(prosody_for(EmotionTag::Sleepy).speed < prosody_for(EmotionTag::Surprised).speed);
    }

    #[test]
    fn request_carries_reference_voice() {
        let character = CharacterConfig {
            ref_audio_path: "/voices/aria.wav".to_string(),
            prompt_text: "reference line".to_string(),
            ..CharacterConfig::default()
        };
        let prosody = prosody_for(EmotionTag::Happy);
        let request = SynthesisRequest {
            text: "Hi there!",
            text_lang: &character.text_lang,
            ref_audio_path: &character.ref_audio_path,
            prompt_text: &character.prompt_text,
            prompt_lang: &character.prompt_lang,
            speed: prosody.speed,
            pitch: prosody.pitch,
            energy: prosody.energy,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["ref_audio_path"], "/voices/aria.wav");
        assert_eq!(json["prompt_text"], "reference line");
        assert_eq!(json["text_lang"], "en");
        assert!((json["speed"].as_f64().unwrap() - 1.1).abs() < 1e-6);
    }
}
