//! Emotion classification for reply text
//!
//! A reply is tagged with one emotion before synthesis so the voice backend
//! can adjust prosody. Classification is a pure function over an injectable
//! keyword table: the same text and table always produce the same tag.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete affect classification of a reply, used to parametrize synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionTag {
    Happy,
    Sad,
    Angry,
    Surprised,
    Sleepy,
    Flirty,
    Tsundere,
    Neutral,
}

impl EmotionTag {
    /// All tags that participate in keyword scoring
    pub const SCORED: [Self; 7] = [
        Self::Happy,
        Self::Sad,
        Self::Angry,
        Self::Surprised,
        Self::Sleepy,
        Self::Flirty,
        Self::Tsundere,
    ];

    /// Tie-break order: when two tags score equal, the earlier one wins
    const PRIORITY: [Self; 7] = [
        Self::Tsundere,
        Self::Angry,
        Self::Surprised,
        Self::Flirty,
        Self::Sad,
        Self::Sleepy,
        Self::Happy,
    ];

    /// Parse a tag from its lowercase name (config files use these)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "happy" => Some(Self::Happy),
            "sad" => Some(Self::Sad),
            "angry" => Some(Self::Angry),
            "surprised" => Some(Self::Surprised),
            "sleepy" => Some(Self::Sleepy),
            "flirty" => Some(Self::Flirty),
            "tsundere" => Some(Self::Tsundere),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// Lowercase name used in logs and config
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Sleepy => "sleepy",
            Self::Flirty => "flirty",
            Self::Tsundere => "tsundere",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EmotionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Keyword and expression tables driving classification
///
/// Keywords score 1 per hit; expressions (interjections strongly bound to one
/// emotion) score 2. Both are matched as lowercase substrings.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    keywords: HashMap<EmotionTag, Vec<String>>,
    expressions: Vec<(String, EmotionTag)>,
    default: EmotionTag,
}

impl Default for KeywordTable {
    fn default() -> Self {
        let mut keywords = HashMap::new();
        keywords.insert(
            EmotionTag::Happy,
            words(&[
                "happy", "excited", "joy", "great", "awesome", "wonderful", "amazing", "love",
                "haha", "yay",
            ]),
        );
        keywords.insert(
            EmotionTag::Sad,
            words(&[
                "sad", "sorry", "disappointed", "upset", "cry", "terrible", "awful", "wrong",
            ]),
        );
        keywords.insert(
            EmotionTag::Angry,
            words(&["angry", "mad", "furious", "annoyed", "stupid", "idiot", "hate", "damn"]),
        );
        keywords.insert(
            EmotionTag::Surprised,
            words(&["wow", "really", "seriously", "no way", "omg", "incredible", "unbelievable"]),
        );
        keywords.insert(
            EmotionTag::Sleepy,
            words(&["tired", "sleepy", "yawn", "exhausted", "sleep", "zzz"]),
        );
        keywords.insert(
            EmotionTag::Flirty,
            words(&["senpai", "cute", "handsome", "darling", "sweetie", "honey", "kiss"]),
        );
        keywords.insert(
            EmotionTag::Tsundere,
            words(&["baka", "idiot", "not like", "it's not", "whatever", "hmph"]),
        );

        let expressions = [
            ("kyaa", EmotionTag::Surprised),
            ("uwu", EmotionTag::Flirty),
            ("owo", EmotionTag::Surprised),
            ("nya", EmotionTag::Happy),
            ("ehehe", EmotionTag::Happy),
            ("ara ara", EmotionTag::Flirty),
            ("baka", EmotionTag::Tsundere),
            ("senpai", EmotionTag::Flirty),
            ("kawaii", EmotionTag::Happy),
        ]
        .into_iter()
        .map(|(w, e)| (w.to_string(), e))
        .collect();

        Self {
            keywords,
            expressions,
            default: EmotionTag::Neutral,
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| (*w).to_string()).collect()
}

impl KeywordTable {
    /// Table with a different default tag for texts where nothing fires
    #[must_use]
    pub fn with_default(mut self, default: EmotionTag) -> Self {
        self.default = default;
        self
    }

    /// Replace the keyword list for one tag
    pub fn set_keywords(&mut self, tag: EmotionTag, list: Vec<String>) {
        self.keywords
            .insert(tag, list.into_iter().map(|w| w.to_lowercase()).collect());
    }

    /// Replace the expression table
    pub fn set_expressions(&mut self, table: Vec<(String, EmotionTag)>) {
        self.expressions = table
            .into_iter()
            .map(|(w, e)| (w.to_lowercase(), e))
            .collect();
    }

    /// The tag produced when no signal fires
    #[must_use]
    pub const fn default_tag(&self) -> EmotionTag {
        self.default
    }
}

/// Classify the emotion of a reply
///
/// Scoring: 2 per expression hit, 1 per keyword hit, plus punctuation
/// signals (`!` happy, `?` surprised, all-caps angry, `...` sad and sleepy).
/// Highest score wins; ties resolve by a fixed priority order; a zero score
/// yields the table's default tag.
#[must_use]
pub fn classify(text: &str, table: &KeywordTable) -> EmotionTag {
    let lower = text.to_lowercase();
    let mut scores: HashMap<EmotionTag, u32> = HashMap::new();

    for (expression, tag) in &table.expressions {
        if lower.contains(expression.as_str()) {
            *scores.entry(*tag).or_default() += 2;
        }
    }

    for tag in EmotionTag::SCORED {
        if let Some(list) = table.keywords.get(&tag) {
            let hits = list.iter().filter(|kw| lower.contains(kw.as_str())).count();
            #[allow(clippy::cast_possible_truncation)]
            {
                *scores.entry(tag).or_default() += hits as u32;
            }
        }
    }

    if text.contains('!') {
        *scores.entry(EmotionTag::Happy).or_default() += 1;
    }
    if text.contains('?') {
        *scores.entry(EmotionTag::Surprised).or_default() += 1;
    }
    if !text.is_empty()
        && text.chars().any(|c| c.is_alphabetic())
        && !text.chars().any(|c| c.is_lowercase())
    {
        *scores.entry(EmotionTag::Angry).or_default() += 2;
    }
    if text.contains("...") {
        *scores.entry(EmotionTag::Sad).or_default() += 1;
        *scores.entry(EmotionTag::Sleepy).or_default() += 1;
    }

    let best = scores.values().copied().max().unwrap_or(0);
    if best == 0 {
        return table.default;
    }

    EmotionTag::PRIORITY
        .into_iter()
        .find(|tag| scores.get(tag).copied().unwrap_or(0) == best)
        .unwrap_or(table.default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_deterministic() {
        let table = KeywordTable::default();
        let text = "Baka! It's not like I care about you or anything!";
        let first = classify(text, &table);
        for _ in 0..10 {
            assert_eq!(classify(text, &table), first);
        }
    }

    #[test]
    fn baka_classifies_as_tsundere() {
        let table = KeywordTable::default();
        assert_eq!(classify("baka", &table), EmotionTag::Tsundere);
        assert_eq!(
            classify("Hmph, baka, whatever.", &table),
            EmotionTag::Tsundere
        );
    }

    #[test]
    fn no_signal_yields_default() {
        let table = KeywordTable::default();
        assert_eq!(classify("the sky is blue today", &table), EmotionTag::Neutral);
    }

    #[test]
    fn configured_default_is_honored() {
        let table = KeywordTable::default().with_default(EmotionTag::Happy);
        assert_eq!(classify("the sky is blue today", &table), EmotionTag::Happy);
    }

    #[test]
    fn exclamation_scores_happy() {
        let table = KeywordTable::default();
        assert_eq!(classify("Hi there!", &table), EmotionTag::Happy);
    }

    #[test]
    fn all_caps_scores_angry() {
        let table = KeywordTable::default();
        assert_eq!(classify("GO AWAY RIGHT NOW", &table), EmotionTag::Angry);
    }

    #[test]
    fn ellipsis_ties_resolve_sad_over_sleepy() {
        // "..." scores sad and sleepy equally; sad precedes sleepy in the
        // priority order.
        let table = KeywordTable::default();
        assert_eq!(classify("i see...", &table), EmotionTag::Sad);
    }

    #[test]
    fn custom_keywords_override_defaults() {
        let mut table = KeywordTable::default();
        table.set_keywords(EmotionTag::Sleepy, vec!["snooze".to_string()]);
        assert_eq!(classify("time to snooze", &table), EmotionTag::Sleepy);
        // old keyword no longer fires for sleepy
        assert_eq!(classify("so tired of this", &table), EmotionTag::Neutral);
    }

    #[test]
    fn empty_text_is_default() {
        let table = KeywordTable::default();
        assert_eq!(classify("", &table), EmotionTag::Neutral);
    }
}
