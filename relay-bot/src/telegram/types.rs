//! Bot API wire types.
//!
//! Only the fields the bot reads are modeled; everything else in Telegram's
//! payloads is ignored by serde.

use serde::{Deserialize, Serialize};

/// Envelope of every Bot API reply.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

/// Entry of the command menu registered with `setMyCommands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// A message from a user, as handed to the pipeline.
///
/// `text` is empty for messages without text (stickers, photos, voice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub language_code: Option<String>,
    pub text: String,
}

impl IncomingMessage {
    /// Convert a raw message; messages without a human sender yield `None`.
    pub(crate) fn from_message(message: Message) -> Option<Self> {
        let from = message.from?;
        if from.is_bot {
            return None;
        }
        Some(Self {
            chat_id: message.chat.id,
            user_id: from.id,
            username: from.username,
            first_name: from.first_name,
            language_code: from.language_code,
            text: message.text.unwrap_or_default(),
        })
    }

    /// Slash command name without the leading `/` or a `@botname` suffix.
    pub fn command(&self) -> Option<&str> {
        let word = self.text.trim_start().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        (!name.is_empty()).then_some(name)
    }

    /// Name used to greet the user.
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("")
    }
}
