//! Slash commands: `/start`, `/help`, `/about`, `/reset`.

use crate::i18n::{t, Language};
use crate::session::SessionStore;
use crate::telegram::{BotCommand, IncomingMessage};

/// Commands the bot answers itself instead of forwarding to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    About,
    Reset,
}

impl Command {
    pub const ALL: [Command; 4] = [Self::Start, Self::Help, Self::About, Self::Reset];

    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::About => "about",
            Self::Reset => "reset",
        }
    }

    /// Recognize a known command; unknown ones are treated as plain text.
    pub fn parse(message: &IncomingMessage) -> Option<Self> {
        let name = message.command()?;
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(name))
    }

    fn description_key(self) -> &'static str {
        match self {
            Self::Start => "cmd_start",
            Self::Help => "cmd_help",
            Self::About => "cmd_about",
            Self::Reset => "cmd_reset",
        }
    }
}

/// Command menu in one language.
pub fn bot_commands(lang: Language) -> Vec<BotCommand> {
    Command::ALL
        .into_iter()
        .map(|cmd| BotCommand::new(cmd.name(), t(lang, cmd.description_key(), &[])))
        .collect()
}

/// Run a command and produce the reply text.
pub fn execute(
    command: Command,
    message: &IncomingMessage,
    store: &SessionStore,
    model: &str,
) -> String {
    tracing::info!(
        user_id = message.user_id,
        command = command.name(),
        "Command received"
    );

    let session = store.get_or_create_session(
        message.user_id,
        message.username.as_deref(),
        message.first_name.as_deref(),
        message.language_code.as_deref(),
    );
    let lang = session.language;

    match command {
        Command::Start => t(lang, "start_welcome", &[("first_name", message.display_name())]),
        Command::Help => t(lang, "help_text", &[]),
        Command::About => t(
            lang,
            "about_text",
            &[("model", model), ("version", env!("CARGO_PKG_VERSION"))],
        ),
        Command::Reset => match store.reset_conversation(message.user_id) {
            Ok(()) => t(lang, "reset_success", &[]),
            Err(e) => {
                tracing::error!(user_id = message.user_id, error = %e, "Reset failed");
                t(lang, "reset_error", &[])
            }
        },
    }
}
