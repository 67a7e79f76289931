//! Chat-completion provider abstraction.
//!
//! The bot talks to one OpenAI-compatible endpoint (OpenRouter by default).
//! The trait keeps the pipeline independent of the HTTP client so tests can
//! swap in a scripted provider.

mod openrouter;

pub use openrouter::OpenRouterProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use relay_common::LlmConfig;

use crate::session::{MessageRole, Turn};

// ============================================================================
// Provider Trait
// ============================================================================

/// Remote chat-completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Send one completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Completion failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to parse response: {0}")]
    Malformed(String),

    #[error("Model returned no content")]
    Empty,

    #[error("API key not configured")]
    MissingApiKey,
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// One role/content pair sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self::new(turn.role, turn.content.clone())
    }
}

/// Chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Assemble a request: system instruction, stored window, then the new turn.
pub fn build_request(
    system_prompt: &str,
    history: &[Turn],
    user_message: &str,
    settings: &LlmConfig,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new(MessageRole::System, system_prompt));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::new(MessageRole::User, user_message));

    ChatRequest {
        model: settings.model.clone(),
        messages,
        max_tokens: Some(settings.max_tokens),
        temperature: Some(settings.temperature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_order_is_system_history_user() {
        let history = vec![
            Turn::new(MessageRole::User, "hi"),
            Turn::new(MessageRole::Assistant, "hello"),
        ];
        let request = build_request("be nice", &history, "how are you?", &LlmConfig::default());

        let roles: Vec<MessageRole> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(request.messages[3].content, "how are you?");
        assert_eq!(request.model, "deepseek/deepseek-chat");
        assert_eq!(request.max_tokens, Some(4000));
    }

    #[test]
    fn system_turn_is_always_first() {
        let request = build_request("", &[], "hey", &LlmConfig::default());
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[1].content, "hey");
    }

    #[test]
    fn request_serializes_wire_roles() {
        let request = build_request("sys", &[], "hey", &LlmConfig::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], 4000);
    }
}
