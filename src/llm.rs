//! Reply generation via a language backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::history::{ConversationTurn, Role};
use crate::{Error, Result};

/// Request timeout for reply generation
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Generates a reply to a user utterance given recent context
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Produce a reply to `text` with the given conversation context
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or times out
    async fn reply(&self, text: &str, context: &[ConversationTurn]) -> Result<String>;
}

/// One role-tagged message in a chat request
#[derive(Debug, Serialize, PartialEq, Eq)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Chat backend speaking the Ollama `/api/chat` protocol
pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    system_prompt: String,
}

impl OllamaChat {
    /// Create a backend for the given server base URL
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, model: String, system_prompt: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Llm(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model,
            system_prompt,
        })
    }
}

/// Assemble the message list: system prompt, then context, then the utterance
fn build_messages(
    system_prompt: &str,
    context: &[ConversationTurn],
    text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(context.len() + 2);
    messages.push(ChatMessage {
        role: "system",
        content: system_prompt.to_string(),
    });
    for turn in context {
        messages.push(ChatMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: turn.content.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: text.to_string(),
    });
    messages
}

#[async_trait]
impl ChatBackend for OllamaChat {
    async fn reply(&self, text: &str, context: &[ConversationTurn]) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: build_messages(&self.system_prompt, context, text),
            stream: false,
        };

        tracing::debug!(
            model = %self.model,
            context_turns = context.len(),
            "requesting reply"
        );

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat backend error");
            return Err(Error::Llm(format!("backend error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse chat response");
            e
        })?;

        let reply = result.message.content.trim().to_string();
        if reply.is_empty() {
            return Err(Error::Llm("backend returned an empty reply".to_string()));
        }

        tracing::info!(reply = %reply, "reply generated");
        Ok(reply)
    }
}
