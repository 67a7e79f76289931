//! Telegram Bot API channel.
//!
//! Long-polls `getUpdates` for text messages and sends replies as HTML with a
//! plain-text fallback.

mod types;

pub use types::{BotCommand, IncomingMessage};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use relay_common::TelegramConfig;

use crate::render;
use types::{ApiResponse, Update};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

// ============================================================================
// Errors and Traits
// ============================================================================

/// Telegram channel error.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid response: {0}")]
    InvalidMessage(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Where the pipeline delivers replies.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Send one reply part, already sized for the platform.
    async fn send_text(&self, chat_id: i64, text: &str) -> ChannelResult<()>;

    /// Show the "typing…" indicator.
    async fn send_typing(&self, chat_id: i64) -> ChannelResult<()>;
}

// ============================================================================
// Telegram Channel
// ============================================================================

/// Telegram channel backed by the HTTP Bot API.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self::with_api_base(config, DEFAULT_API_BASE)
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(config: &TelegramConfig, api_base: &str) -> Self {
        // The HTTP timeout must outlive the long-poll window.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            bot_token: config.bot_token.clone(),
            allowed_users: config.allowed_users.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_user_allowed(&self, message: &IncomingMessage) -> bool {
        let user_id = message.user_id.to_string();
        self.allowed_users.iter().any(|allowed| {
            let allowed = allowed.trim_start_matches('@');
            allowed == "*" || allowed == user_id || message.username.as_deref() == Some(allowed)
        })
    }

    /// Call a Bot API method and unwrap the `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> ChannelResult<T> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        let envelope: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| {
            ChannelError::InvalidMessage(format!("{method} ({status}): {e}"))
        })?;

        if !envelope.ok {
            let description = envelope.description.unwrap_or_else(|| status.to_string());
            return Err(match envelope.error_code {
                Some(401 | 404) => ChannelError::Auth(description),
                _ => ChannelError::SendFailed(description),
            });
        }

        envelope
            .result
            .ok_or_else(|| ChannelError::InvalidMessage(format!("{method}: missing result")))
    }

    /// Check the bot token with `getMe`; returns the bot's username.
    pub async fn verify(&self) -> ChannelResult<String> {
        let me: serde_json::Value = self.call("getMe", &json!({})).await?;
        let username = me
            .get("username")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        tracing::info!(bot = %username, "Telegram channel initialized");
        Ok(username)
    }

    /// Register the command menu shown by Telegram clients.
    ///
    /// Without `language_code` the menu is the fallback for all users.
    pub async fn set_commands(
        &self,
        commands: &[BotCommand],
        language_code: Option<&str>,
    ) -> ChannelResult<()> {
        let mut body = json!({ "commands": commands });
        if let Some(code) = language_code {
            body["language_code"] = json!(code);
        }
        let _: bool = self.call("setMyCommands", &body).await?;
        tracing::info!(
            count = commands.len(),
            language = language_code.unwrap_or("default"),
            "Bot commands registered"
        );
        Ok(())
    }

    /// Fetch one batch of updates starting at `offset`.
    ///
    /// Returns the allowed text messages and the offset for the next call.
    pub async fn poll_once(&self, offset: i64) -> ChannelResult<(Vec<IncomingMessage>, i64)> {
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;

        let mut next_offset = offset;
        let mut messages = Vec::with_capacity(updates.len());
        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);
            let Some(message) = update.message.and_then(IncomingMessage::from_message) else {
                continue;
            };
            if !self.is_user_allowed(&message) {
                tracing::warn!(
                    user_id = message.user_id,
                    username = message.username.as_deref().unwrap_or("unknown"),
                    "Ignoring message from unauthorized user"
                );
                continue;
            }
            messages.push(message);
        }
        Ok((messages, next_offset))
    }

    /// Poll until `shutdown` flips to `true`, handing each message to `on_message`.
    pub async fn listen<F>(&self, mut shutdown: watch::Receiver<bool>, on_message: F)
    where
        F: Fn(IncomingMessage) + Send + Sync,
    {
        let mut offset: i64 = 0;
        tracing::info!("Telegram channel listening for messages...");

        while !*shutdown.borrow() {
            let batch = tokio::select! {
                result = self.poll_once(offset) => result,
                _ = shutdown.changed() => break,
            };

            match batch {
                Ok((messages, next_offset)) => {
                    offset = next_offset;
                    for message in messages {
                        on_message(message);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Telegram poll error");
                    tokio::select! {
                        () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        tracing::info!("Telegram channel stopped listening");
    }

    async fn send_message(&self, chat_id: i64, text: &str, html: bool) -> ChannelResult<()> {
        let body = if html {
            json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" })
        } else {
            json!({ "chat_id": chat_id, "text": text })
        };
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl OutboundSink for TelegramChannel {
    async fn send_text(&self, chat_id: i64, text: &str) -> ChannelResult<()> {
        let html = render::to_telegram_html(text);
        match self.send_message(chat_id, &html, true).await {
            Err(ChannelError::SendFailed(reason)) if is_formatting_rejection(&reason) => {
                tracing::warn!(
                    chat_id,
                    reason = %reason,
                    "HTML rejected, retrying as plain text"
                );
                self.send_message(chat_id, text, false).await
            }
            other => other,
        }
    }

    async fn send_typing(&self, chat_id: i64) -> ChannelResult<()> {
        let _: bool = self
            .call(
                "sendChatAction",
                &json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }
}

/// Rejections a plain-text resend can fix. Escaping may push rendered HTML
/// past the size limit even when the raw part fits.
fn is_formatting_rejection(reason: &str) -> bool {
    reason.contains("can't parse entities") || reason.contains("message is too long")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(allowed: &[&str]) -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:abc".into(),
            allowed_users: allowed.iter().map(|s| (*s).to_string()).collect(),
            poll_timeout_secs: 0,
            ..TelegramConfig::default()
        }
    }

    fn text_update(update_id: i64, user_id: i64, username: &str, text: &str) -> serde_json::Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "chat": {"id": user_id},
                "from": {"id": user_id, "is_bot": false, "username": username, "first_name": "T"},
                "text": text
            }
        })
    }

    #[test]
    fn api_url_includes_token() {
        let channel = TelegramChannel::new(&config(&["*"]));
        assert_eq!(
            channel.api_url("getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );
    }

    #[test]
    fn formatting_rejections() {
        assert!(is_formatting_rejection(
            "Bad Request: can't parse entities: unsupported start tag"
        ));
        assert!(is_formatting_rejection("Bad Request: message is too long"));
        assert!(!is_formatting_rejection("Forbidden: bot was blocked by the user"));
    }

    #[tokio::test]
    async fn poll_filters_and_advances_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    text_update(7, 1, "alice", "hi"),
                    text_update(8, 2, "mallory", "let me in"),
                    {"update_id": 9, "edited_message": {}}
                ]
            })))
            .mount(&server)
            .await;

        let channel = TelegramChannel::with_api_base(&config(&["@alice"]), &server.uri());
        let (messages, offset) = channel.poll_once(0).await.unwrap();

        assert_eq!(offset, 10);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hi");
    }

    #[tokio::test]
    async fn allow_list_accepts_numeric_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [text_update(1, 555, "bob", "yo")]
            })))
            .mount(&server)
            .await;

        let channel = TelegramChannel::with_api_base(&config(&["555"]), &server.uri());
        let (messages, _) = channel.poll_once(0).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn send_text_uses_html() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": 9,
                "text": "<b>hi</b>",
                "parse_mode": "HTML"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TelegramChannel::with_api_base(&config(&["*"]), &server.uri());
        channel.send_text(9, "**hi**").await.unwrap();
    }

    #[tokio::test]
    async fn send_text_falls_back_to_plain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"parse_mode": "HTML"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities: unexpected end tag"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"text": "**hi**"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TelegramChannel::with_api_base(&config(&["*"]), &server.uri());
        channel.send_text(9, "**hi**").await.unwrap();
    }

    #[tokio::test]
    async fn other_send_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TelegramChannel::with_api_base(&config(&["*"]), &server.uri());
        let err = channel.send_text(9, "hello").await.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed(_)));
    }

    #[tokio::test]
    async fn verify_rejects_bad_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getMe"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false,
                "error_code": 401,
                "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let channel = TelegramChannel::with_api_base(&config(&["*"]), &server.uri());
        assert!(matches!(channel.verify().await, Err(ChannelError::Auth(_))));
    }

    #[tokio::test]
    async fn set_commands_posts_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/setMyCommands"))
            .and(body_partial_json(json!({
                "commands": [{"command": "start", "description": "Start"}],
                "language_code": "en"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TelegramChannel::with_api_base(&config(&["*"]), &server.uri());
        channel
            .set_commands(&[BotCommand::new("start", "Start")], Some("en"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn listen_stops_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let channel = TelegramChannel::with_api_base(&config(&["*"]), &server.uri());
        let (tx, rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            let _ = tx.send(true);
        });

        tokio::time::timeout(Duration::from_secs(5), channel.listen(rx, |_| {}))
            .await
            .unwrap();
        stopper.await.unwrap();
    }
}
