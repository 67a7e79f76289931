//! Localized user-facing strings.
//!
//! Two languages are supported. Lookups fall back to English and then to the
//! raw key, so a missing translation never breaks a reply.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Languages the bot can answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ru,
    En,
}

impl Language {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ru => "ru",
            Self::En => "en",
        }
    }

    /// Recognize a client language tag such as `ru`, `ru-RU` or `en-US`.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.starts_with("ru") {
            Some(Self::Ru)
        } else if tag.starts_with("en") {
            Some(Self::En)
        } else {
            None
        }
    }

    /// Map an optional, possibly unsupported tag onto a supported language.
    pub fn normalize(tag: Option<&str>, default: Language) -> Self {
        tag.and_then(Self::parse).unwrap_or(default)
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::Ru
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

type Table = HashMap<&'static str, &'static str>;

static RU: LazyLock<Table> = LazyLock::new(|| {
    HashMap::from([
        ("no_text_message", "Нет текстового сообщения для обработки."),
        ("empty_message", "Пустое сообщение не может быть обработано."),
        (
            "message_too_long",
            "Сообщение слишком длинное. Максимум {max} символов.",
        ),
        (
            "message_has_profanity",
            "Ваше сообщение содержит недопустимые выражения. Пожалуйста, используйте корректный язык.",
        ),
        ("ai_no_response", "Извините, не удалось получить ответ."),
        (
            "error_general",
            "Извините, произошла ошибка при обработке вашего запроса. Попробуйте позже.",
        ),
        (
            "error_ai",
            "Не удалось получить ответ от AI. Проверьте подключение и попробуйте снова.",
        ),
        (
            "error_rate_limit",
            "Слишком много запросов. Пожалуйста, подождите немного.",
        ),
        (
            "unexpected_error",
            "Произошла непредвиденная ошибка. Пожалуйста, попробуйте позже.",
        ),
        (
            "start_welcome",
            "👋 Привет, {first_name}!\n\n\
             Я AI ассистент. Я могу помочь тебе с вопросами, поддержать беседу и просто пообщаться.\n\n\
             Просто напиши мне что-нибудь, и я отвечу!\n\n\
             Используй /help для списка доступных команд.",
        ),
        (
            "help_text",
            "📚 **Доступные команды:**\n\n\
             /start - Начать работу с ботом\n\
             /help - Показать это сообщение\n\
             /about - Информация о боте\n\
             /reset - Сбросить контекст диалога\n\n\
             Просто отправь мне сообщение, и я отвечу!",
        ),
        (
            "about_text",
            "🤖 **О боте**\n\n\
             Я Telegram бот, который передаёт ваши сообщения языковой модели.\n\n\
             **Возможности:**\n\
             - Естественный диалог на русском и английском\n\
             - Сохранение контекста беседы\n\
             - Фильтрация нецензурного контента\n\n\
             Модель: {model}\n\
             Версия: {version}",
        ),
        (
            "reset_success",
            "🔄 **Контекст диалога сброшен**\n\n\
             Все предыдущие сообщения удалены. Можем начать новую беседу!",
        ),
        (
            "reset_error",
            "Произошла ошибка при сбросе контекста. Попробуйте позже.",
        ),
        ("cmd_start", "Начать работу с ботом"),
        ("cmd_help", "Показать справку"),
        ("cmd_about", "Информация о боте"),
        ("cmd_reset", "Сбросить контекст диалога"),
    ])
});

static EN: LazyLock<Table> = LazyLock::new(|| {
    HashMap::from([
        ("no_text_message", "There is no text message to process."),
        ("empty_message", "An empty message cannot be processed."),
        (
            "message_too_long",
            "The message is too long. Maximum is {max} characters.",
        ),
        (
            "message_has_profanity",
            "Your message contains inappropriate language. Please use respectful wording.",
        ),
        ("ai_no_response", "Sorry, I couldn't get a response."),
        (
            "error_general",
            "Sorry, an error occurred while processing your request. Please try again later.",
        ),
        (
            "error_ai",
            "Failed to get a response from the AI. Please check the connection and try again.",
        ),
        ("error_rate_limit", "Too many requests. Please wait a bit."),
        (
            "unexpected_error",
            "An unexpected error occurred. Please try again later.",
        ),
        (
            "start_welcome",
            "👋 Hi, {first_name}!\n\n\
             I'm an AI assistant. I can help you with questions, keep up a conversation, or just chat.\n\n\
             Just send me a message and I'll reply!\n\n\
             Use /help to see the list of available commands.",
        ),
        (
            "help_text",
            "📚 **Available commands:**\n\n\
             /start - Start working with the bot\n\
             /help - Show this message\n\
             /about - Information about the bot\n\
             /reset - Reset conversation context\n\n\
             Just send me a message and I'll reply!",
        ),
        (
            "about_text",
            "🤖 **About the bot**\n\n\
             I'm a Telegram bot that relays your messages to a language model.\n\n\
             **Capabilities:**\n\
             - Natural conversation in Russian and English\n\
             - Conversation context saving\n\
             - Profanity filtering\n\n\
             Model: {model}\n\
             Version: {version}",
        ),
        (
            "reset_success",
            "🔄 **Conversation context has been reset**\n\n\
             All previous messages were cleared. We can start a new conversation!",
        ),
        (
            "reset_error",
            "An error occurred while resetting the context. Please try again later.",
        ),
        ("cmd_start", "Start working with the bot"),
        ("cmd_help", "Show help"),
        ("cmd_about", "Information about the bot"),
        ("cmd_reset", "Reset conversation context"),
    ])
});

fn table(lang: Language) -> &'static Table {
    match lang {
        Language::Ru => &RU,
        Language::En => &EN,
    }
}

/// Look up `key` for `lang` and fill `{name}` placeholders from `vars`.
pub fn t(lang: Language, key: &str, vars: &[(&str, &str)]) -> String {
    let template = match table(lang).get(key).or_else(|| EN.get(key)) {
        Some(text) => *text,
        None => {
            tracing::warn!(key, lang = %lang, "Missing translation");
            key
        }
    };

    let mut text = template.to_string();
    for (name, value) in vars {
        text = text.replace(&format!("{{{name}}}"), value);
    }
    text
}
