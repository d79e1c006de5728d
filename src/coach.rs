// AI coach: chat-completion client, journaling prompts and fallback replies.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Reply shown when the completion service cannot answer.
pub const FALLBACK_REPLY: &str =
    "I'm having trouble responding right now. Please try again in a moment.";

const COACH_PROMPT: &str = "You are a warm, encouraging personal-development coach. \
Keep answers short, practical and kind. Never give medical advice.";

const JOURNAL_PROMPT: &str = "You read a gratitude journal entry and reply with a brief, \
supportive reflection that names one positive theme and suggests one small next step.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Hosted chat-completion endpoint.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiChat {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("https://api.openai.com/v1", api_key, "gpt-4o-mini")
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ChatClient for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        let mut req = self.client.post(&url).timeout(self.timeout).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("chat completion failed: HTTP {}: {}", status.as_u16(), text));
        }

        let json: Value = resp.json().await?;
        parse_completion(&json)
    }
}

/// Extract the first choice's message content.
pub fn parse_completion(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("missing content in chat completion response"))
}

/// Conversation with the coach. Failures become [`FALLBACK_REPLY`].
pub struct Coach<C: ChatClient> {
    client: C,
    history: Vec<ChatMessage>,
}

impl<C: ChatClient> Coach<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            history: vec![ChatMessage::new(Role::System, COACH_PROMPT)],
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send a user message and return the coach's reply.
    ///
    /// A failed call is not recorded in the history so the user can resend.
    pub async fn ask(&mut self, text: &str) -> String {
        self.history.push(ChatMessage::new(Role::User, text));
        match self.client.complete(&self.history).await {
            Ok(reply) => {
                debug!("coach replied ({} chars)", reply.len());
                self.history.push(ChatMessage::new(Role::Assistant, reply.clone()));
                reply
            }
            Err(e) => {
                warn!("coach completion failed: {}", e);
                self.history.pop();
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// One-shot reflection on a journal entry, independent of the chat history.
    pub async fn analyze_journal(&self, entry: &str) -> String {
        let messages = [
            ChatMessage::new(Role::System, JOURNAL_PROMPT),
            ChatMessage::new(Role::User, entry),
        ];
        match self.client.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("journal analysis failed: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}
