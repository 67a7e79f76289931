//! Relay Bot - Telegram front end for a chat-completion model.
//!
//! Each text message is validated, sent to the model together with the
//! user's recent history, censored, stored, split to fit Telegram's size
//! limit and sent back.
//!
//! ## Architecture
//!
//! ```text
//! Telegram ── getUpdates ──→ Pipeline ──→ Provider (OpenRouter)
//!                              │  ↑
//!                              ↓  │
//!                         SessionStore
//!                              │
//! Telegram ←── sendMessage ── chunker → render
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chunker;
pub mod commands;
pub mod filter;
pub mod i18n;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod session;
pub mod telegram;

pub use chunker::{chunk_message, split_message};
pub use filter::{ContentFilter, ProfanityLexicon, ValidationFailure, WordListLexicon};
pub use i18n::{t, Language};
pub use pipeline::{Outcome, Pipeline, PipelineSettings, TurnError};
pub use provider::{ChatRequest, ChatResponse, OpenRouterProvider, Provider, ProviderError};
pub use session::{MessageRole, Session, SessionStore, StoreError, Turn};
pub use telegram::{ChannelError, IncomingMessage, OutboundSink, TelegramChannel};

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;

use relay_common::Config;

/// Wire all components from `config` and poll Telegram until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let default_language = Language::normalize(
        Some(config.session.default_language.as_str()),
        Language::default(),
    );

    let store = Arc::new(SessionStore::new(
        config.session.max_context_messages,
        default_language,
    ));
    let filter = ContentFilter::from_config(&config.filter)
        .context("Failed to build profanity lexicon")?;
    let provider: Arc<dyn Provider> = Arc::new(OpenRouterProvider::new(&config.llm));
    let channel = Arc::new(TelegramChannel::new(&config.telegram));

    let bot = channel.verify().await.context("Telegram token check failed")?;
    register_commands(&channel, default_language).await;

    let pipeline = Arc::new(Pipeline::new(
        store,
        filter,
        provider,
        channel.clone(),
        PipelineSettings::new(config.llm.clone(), config.telegram.max_message_len),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(
        bot = %bot,
        model = %config.llm.model,
        language = %default_language,
        "Relay bot started"
    );

    channel
        .listen(shutdown_rx, move |message| spawn_turn(&pipeline, message))
        .await;

    tracing::info!("Relay bot stopped");
    Ok(())
}

/// Run one message on its own task. A panicking turn still gets a reply.
fn spawn_turn(pipeline: &Arc<Pipeline>, message: IncomingMessage) {
    let chat_id = message.chat_id;
    let lang = pipeline.store().get_user_language(message.user_id);
    let sink = Arc::clone(pipeline.sink());
    let pipeline = Arc::clone(pipeline);

    tokio::spawn(async move {
        let turn = tokio::spawn(async move { pipeline.handle(message).await });
        if let Err(e) = turn.await {
            tracing::error!(chat_id, error = %e, "Message handler crashed");
            if let Err(e) = sink
                .send_text(chat_id, &t(lang, "unexpected_error", &[]))
                .await
            {
                tracing::warn!(error = %e, "Failed to report crash to user");
            }
        }
    });
}

/// Register the command menu for both languages; failures are not fatal.
async fn register_commands(channel: &TelegramChannel, default_language: Language) {
    let menus = [
        (None, default_language),
        (Some("ru"), Language::Ru),
        (Some("en"), Language::En),
    ];
    for (code, lang) in menus {
        if let Err(e) = channel
            .set_commands(&commands::bot_commands(lang), code)
            .await
        {
            tracing::warn!(error = %e, language = code.unwrap_or("default"), "Failed to register commands");
        }
    }
}
