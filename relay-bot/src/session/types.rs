//! Session and conversation turn types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::i18n::Language;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    /// Instruction prepended to completion requests
    System,
}

impl MessageRole {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// One stored message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Per-user conversation record.
///
/// Returned by value from the store; mutating a copy has no effect on the
/// stored session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque id, unique for the lifetime of the process
    pub id: String,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub language: Language,
    /// Free-form key/value context attached by handlers
    pub context: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session id is unknown. Benign for most callers.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Internal bookkeeping disagreed with itself and was repaired.
    #[error("Session store inconsistent: {0}")]
    Inconsistent(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
