//! Configuration validation.
//!
//! Checks that required credentials are present and numeric settings are
//! within ranges the bot can operate with.

use thiserror::Error;

use crate::config::{Config, LlmConfig, SessionConfig, TelegramConfig};

/// Smallest chunk budget that still leaves room for fence bookkeeping.
pub const MIN_MESSAGE_LEN: usize = 16;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        validate_telegram(&self.telegram, &mut errors);
        validate_llm(&self.llm, &mut errors);
        validate_session(&self.session, &mut errors);

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

fn validate_telegram(telegram: &TelegramConfig, errors: &mut Vec<ValidationError>) {
    if telegram.bot_token.trim().is_empty() {
        errors.push(ValidationError::MissingField {
            field: "telegram.bot_token".into(),
        });
    }
    if telegram.max_message_len < MIN_MESSAGE_LEN {
        errors.push(ValidationError::InvalidValue {
            field: "telegram.max_message_len".into(),
            reason: format!("must be at least {MIN_MESSAGE_LEN}"),
        });
    }
}

fn validate_llm(llm: &LlmConfig, errors: &mut Vec<ValidationError>) {
    if llm.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingField {
            field: "llm.api_key".into(),
        });
    }
    if llm.system_prompt.trim().is_empty() {
        errors.push(ValidationError::MissingField {
            field: "llm.system_prompt".into(),
        });
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        errors.push(ValidationError::InvalidValue {
            field: "llm.temperature".into(),
            reason: "must be between 0.0 and 2.0".into(),
        });
    }
    if llm.timeout_secs == 0 {
        errors.push(ValidationError::InvalidValue {
            field: "llm.timeout_secs".into(),
            reason: "must be positive".into(),
        });
    }
}

fn validate_session(session: &SessionConfig, errors: &mut Vec<ValidationError>) {
    if session.max_context_messages == 0 {
        errors.push(ValidationError::InvalidValue {
            field: "session.max_context_messages".into(),
            reason: "must be positive".into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".into();
        config.llm.api_key = "sk-test".into();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_misses_credentials() {
        let err = Config::default().validate().unwrap_err();
        match err {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test_case(-0.1 ; "below range")]
    #[test_case(2.5 ; "above range")]
    fn test_temperature_out_of_range(temperature: f64) {
        let mut config = valid_config();
        config.llm.temperature = temperature;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "llm.temperature"
        ));
    }

    #[test]
    fn test_tiny_chunk_budget_rejected() {
        let mut config = valid_config();
        config.telegram.max_message_len = 8;
        assert!(config.validate().is_err());
    }

    #[test_case("" ; "empty")]
    #[test_case(" \n\t" ; "whitespace")]
    fn test_blank_system_prompt_rejected(prompt: &str) {
        let mut config = valid_config();
        config.llm.system_prompt = prompt.into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingField { ref field }) if field == "llm.system_prompt"
        ));
    }

    #[test]
    fn test_zero_context_rejected() {
        let mut config = valid_config();
        config.session.max_context_messages = 0;
        assert!(config.validate().is_err());
    }
}
