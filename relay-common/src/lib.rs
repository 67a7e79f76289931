//! Relay Common - Shared configuration, errors and logging for the relay bot.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and trace id helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, FilterConfig, LlmConfig, ObservabilityConfig, SessionConfig, TelegramConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{ValidationError, ValidationResult};
