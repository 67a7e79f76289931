//! Per-message orchestration.
//!
//! ```text
//! validate → fetch context → call model → censor → persist → chunk & send
//! ```
//!
//! A model failure short-circuits to a localized error reply and nothing is
//! persisted. Turns of one user are serialized; different users run in
//! parallel.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::Instrument;

use relay_common::logging::{generate_trace_id, preview};
use relay_common::LlmConfig;

use crate::chunker::chunk_message;
use crate::commands::{self, Command};
use crate::filter::{ContentFilter, ValidationFailure};
use crate::i18n::{t, Language};
use crate::provider::{build_request, Provider, ProviderError};
use crate::session::{MessageRole, SessionStore, StoreError};
use crate::telegram::{IncomingMessage, OutboundSink};

// ============================================================================
// Errors and Outcomes
// ============================================================================

/// Failure of one conversational turn after validation passed.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TurnError {
    /// Localization key of the reply shown to the user.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::Provider(ProviderError::RateLimited) => "error_rate_limit",
            Self::Provider(ProviderError::Empty) => "ai_no_response",
            Self::Provider(_) => "error_ai",
            Self::Store(_) => "error_general",
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug)]
pub enum Outcome {
    /// Answered by a slash command
    Command(Command),
    /// The message carried no text
    NoText,
    /// Rejected by the content filter
    Rejected(ValidationFailure),
    /// Model reply delivered in `sent` of `parts` parts
    Replied { parts: usize, sent: usize },
    /// Turn aborted; the user got an error reply
    Failed(TurnError),
}

// ============================================================================
// Pipeline
// ============================================================================

/// Tunables of the pipeline taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub llm: LlmConfig,
    /// Size budget of one outgoing part
    pub max_message_len: usize,
    /// Upper bound for the model call
    pub completion_timeout: Duration,
}

impl PipelineSettings {
    pub fn new(llm: LlmConfig, max_message_len: usize) -> Self {
        let completion_timeout = Duration::from_secs(llm.timeout_secs);
        Self {
            llm,
            max_message_len,
            completion_timeout,
        }
    }
}

/// Glue between the channel, the store, the filter and the model.
pub struct Pipeline {
    store: Arc<SessionStore>,
    filter: ContentFilter,
    provider: Arc<dyn Provider>,
    sink: Arc<dyn OutboundSink>,
    settings: PipelineSettings,
    turn_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<SessionStore>,
        filter: ContentFilter,
        provider: Arc<dyn Provider>,
        sink: Arc<dyn OutboundSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            filter,
            provider,
            sink,
            settings,
            turn_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn OutboundSink> {
        &self.sink
    }

    /// Handle one inbound message end to end.
    pub async fn handle(&self, message: IncomingMessage) -> Outcome {
        let span = tracing::info_span!(
            "turn",
            trace_id = %generate_trace_id(),
            user_id = message.user_id,
            chat_id = message.chat_id,
        );
        self.handle_inner(message).instrument(span).await
    }

    async fn handle_inner(&self, message: IncomingMessage) -> Outcome {
        if let Some(command) = Command::parse(&message) {
            // Commands touch the session too, so they queue behind a running turn.
            let lock = self.turn_lock(message.user_id);
            let _turn = lock.lock().await;
            let reply = commands::execute(command, &message, &self.store, &self.settings.llm.model);
            self.deliver(message.chat_id, &reply).await;
            return Outcome::Command(command);
        }

        let session = self.store.get_or_create_session(
            message.user_id,
            message.username.as_deref(),
            message.first_name.as_deref(),
            message.language_code.as_deref(),
        );
        let lang = session.language;

        if message.text.is_empty() {
            self.notify(message.chat_id, lang, "no_text_message").await;
            return Outcome::NoText;
        }

        tracing::info!(
            session_id = %session.id,
            text = %preview(&message.text, 80),
            "Message received"
        );

        if let Err(failure) = self.filter.validate_inbound(&message.text) {
            tracing::warn!(reason = %failure, "Message rejected");
            self.send_notice(message.chat_id, &failure.user_message(lang))
                .await;
            return Outcome::Rejected(failure);
        }

        let lock = self.turn_lock(message.user_id);
        let _turn = lock.lock().await;

        if let Err(e) = self.sink.send_typing(message.chat_id).await {
            tracing::debug!(error = %e, "Typing indicator failed");
        }

        let reply = match self.complete_turn(&session.id, &message.text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                self.notify(message.chat_id, lang, e.message_key()).await;
                return Outcome::Failed(e);
            }
        };

        let (parts, sent) = self.deliver(message.chat_id, &reply).await;
        if parts == 0 {
            self.notify(message.chat_id, lang, "ai_no_response").await;
        }
        tracing::info!(parts, sent, "Reply delivered");
        Outcome::Replied { parts, sent }
    }

    /// Fetch context, call the model, censor and persist the turn.
    async fn complete_turn(&self, session_id: &str, text: &str) -> Result<String, TurnError> {
        let history = self.store.get_history(session_id);
        let request = build_request(
            &self.settings.llm.system_prompt,
            &history,
            text,
            &self.settings.llm,
        );

        let timeout = self.settings.completion_timeout;
        let response = tokio::time::timeout(timeout, self.provider.chat(request))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))??;

        tracing::debug!(
            latency_ms = response.latency_ms,
            tokens = response.usage.total_tokens,
            history = history.len(),
            "Model replied"
        );

        let reply = self.filter.filter_outbound(response.content.trim()).into_owned();

        self.store
            .append_message(session_id, MessageRole::User, text)?;
        self.store
            .append_message(session_id, MessageRole::Assistant, &reply)?;
        Ok(reply)
    }

    /// Chunk `text` and send the parts in order. Returns (parts, sent).
    async fn deliver(&self, chat_id: i64, text: &str) -> (usize, usize) {
        let parts: Vec<String> = chunk_message(text, self.settings.max_message_len)
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .collect();

        let mut sent = 0;
        for (index, part) in parts.iter().enumerate() {
            match self.sink.send_text(chat_id, part).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!(
                    part = index + 1,
                    total = parts.len(),
                    error = %e,
                    "Failed to send reply part"
                ),
            }
        }
        (parts.len(), sent)
    }

    async fn notify(&self, chat_id: i64, lang: Language, key: &str) {
        self.send_notice(chat_id, &t(lang, key, &[])).await;
    }

    async fn send_notice(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.sink.send_text(chat_id, text).await {
            tracing::warn!(error = %e, "Failed to send notice");
        }
    }

    /// Lock serializing everything one user triggers. Entries live as long
    /// as the pipeline, like the sessions they guard.
    fn turn_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        Arc::clone(self.turn_locks.entry(user_id).or_default().value())
    }
}
