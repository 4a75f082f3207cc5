//! Conversation history
//!
//! Turns are appended to a JSON-lines file after every completed exchange.
//! Only the context window of recent turns is held in memory; the file
//! keeps the full record.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;
use crate::config::HistoryConfig;
use crate::emotion::EmotionTag;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One utterance in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Emotion the reply was synthesized with; absent for user turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<EmotionTag>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(role: Role, content: String, emotion: Option<EmotionTag>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            emotion,
            timestamp: Utc::now(),
        }
    }
}

/// In-memory history backed by an append-only JSON-lines file
pub struct ConversationHistory {
    path: PathBuf,
    context_window: usize,
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    /// Load history from disk, keeping only the context window in memory
    ///
    /// A missing file starts an empty history. A corrupt file also starts an
    /// empty history, with a warning; history is never allowed to prevent
    /// startup.
    #[must_use]
    pub fn load(config: &HistoryConfig) -> Self {
        let turns = match std::fs::read_to_string(&config.path) {
            Ok(content) => {
                let parsed: std::result::Result<Vec<ConversationTurn>, _> = content
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(serde_json::from_str)
                    .collect();
                match parsed {
                    Ok(turns) => {
                        tracing::debug!(
                            path = %config.path.display(),
                            turns = turns.len(),
                            "loaded conversation history"
                        );
                        turns
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %config.path.display(),
                            error = %e,
                            "corrupt history file, starting empty"
                        );
                        Vec::new()
                    }
                }
            }
            Err(_) => Vec::new(),
        };

        let mut history = Self {
            path: config.path.clone(),
            context_window: config.context_window,
            turns,
        };
        history.trim_to_window();
        history
    }

    /// Record a completed exchange and append it to the history file
    ///
    /// # Errors
    ///
    /// Returns error if the turns cannot be written to disk; the in-memory
    /// history is updated regardless.
    pub fn record_exchange(
        &mut self,
        user_text: &str,
        reply: &str,
        emotion: EmotionTag,
    ) -> Result<()> {
        let user = ConversationTurn::new(Role::User, user_text.to_string(), None);
        let assistant =
            ConversationTurn::new(Role::Assistant, reply.to_string(), Some(emotion));

        let result = self.append_lines(&[&user, &assistant]);
        self.turns.push(user);
        self.turns.push(assistant);
        self.trim_to_window();
        result
    }

    /// Recent turns for the language backend, newest last
    #[must_use]
    pub fn context(&self) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(self.context_window);
        &self.turns[start..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop turns older than the context window; the file keeps them
    fn trim_to_window(&mut self) {
        let excess = self.turns.len().saturating_sub(self.context_window);
        if excess > 0 {
            self.turns.drain(..excess);
        }
    }

    fn append_lines(&self, turns: &[&ConversationTurn]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        for turn in turns {
            let line = serde_json::to_string(turn)?;
            writeln!(file, "{line}")?;
        }

        Ok(())
    }
}
