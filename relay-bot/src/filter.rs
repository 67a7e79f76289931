//! Inbound validation and outbound censoring.

use regex::{Captures, Regex, RegexBuilder};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

use relay_common::FilterConfig;

use crate::i18n::{t, Language};

/// Built-in lexicon. A trailing `*` marks a stem that also matches any
/// word starting with it.
const BUILTIN_WORDS: &[&str] = &[
    // English
    "fuck*",
    "motherfuck*",
    "shit",
    "shits",
    "shitty",
    "bullshit",
    "bitch*",
    "cunt*",
    "asshole*",
    "bastard*",
    "dickhead*",
    "whore*",
    // Russian
    "хуй*",
    "хуе*",
    "хуя*",
    "пизд*",
    "ебат*",
    "ебан*",
    "ебал*",
    "ёбан*",
    "бля",
    "блять",
    "блядь*",
    "сука",
    "суки",
    "мудак*",
    "залуп*",
    "гандон*",
];

// ============================================================================
// Lexicon
// ============================================================================

/// Profanity detection and masking backend.
pub trait ProfanityLexicon: Send + Sync {
    fn contains_profanity(&self, text: &str) -> bool;

    /// Mask offending words, keeping the text's length in characters.
    fn censor(&self, text: &str) -> String;
}

/// Whole-word, case-insensitive word-list matcher.
pub struct WordListLexicon {
    pattern: Regex,
}

impl WordListLexicon {
    /// Built-in list extended with `extra` words.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> Result<Self, regex::Error> {
        let mut words: Vec<&str> = BUILTIN_WORDS.to_vec();
        words.extend(extra.iter().map(|w| w.as_ref()));

        let alternatives: Vec<String> = words
            .into_iter()
            .map(str::trim)
            .filter(|w| !w.is_empty() && *w != "*")
            .map(|word| match word.strip_suffix('*') {
                Some(stem) => format!(r"{}\w*", regex::escape(stem)),
                None => regex::escape(word),
            })
            .collect();

        let pattern = RegexBuilder::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }
}

impl ProfanityLexicon for WordListLexicon {
    fn contains_profanity(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    fn censor(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures| {
                "*".repeat(caps.get(0).map_or(0, |m| m.as_str().chars().count()))
            })
            .into_owned()
    }
}

// ============================================================================
// Content Filter
// ============================================================================

/// Why an inbound message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("empty message")]
    Empty,

    #[error("message too long ({len} > {max})")]
    TooLong { len: usize, max: usize },

    #[error("profanity detected")]
    Profanity,
}

impl ValidationFailure {
    /// Localized explanation for the user.
    pub fn user_message(&self, lang: Language) -> String {
        match self {
            Self::Empty => t(lang, "empty_message", &[]),
            Self::TooLong { max, .. } => t(lang, "message_too_long", &[("max", &max.to_string())]),
            Self::Profanity => t(lang, "message_has_profanity", &[]),
        }
    }
}

/// Length and profanity checks around the model call.
#[derive(Clone)]
pub struct ContentFilter {
    enabled: bool,
    max_len: usize,
    lexicon: Arc<dyn ProfanityLexicon>,
}

impl ContentFilter {
    pub fn new(max_len: usize, lexicon: Arc<dyn ProfanityLexicon>) -> Self {
        Self {
            enabled: true,
            max_len,
            lexicon,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self, regex::Error> {
        let lexicon = WordListLexicon::new(config.extra_words.as_slice())?;
        Ok(Self {
            enabled: config.enabled,
            max_len: config.max_message_len,
            lexicon: Arc::new(lexicon),
        })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Reject blank, over-long or profane input.
    pub fn validate_inbound(&self, text: &str) -> Result<(), ValidationFailure> {
        if text.trim().is_empty() {
            return Err(ValidationFailure::Empty);
        }
        let len = text.chars().count();
        if len > self.max_len {
            return Err(ValidationFailure::TooLong {
                len,
                max: self.max_len,
            });
        }
        if self.enabled && self.lexicon.contains_profanity(text) {
            return Err(ValidationFailure::Profanity);
        }
        Ok(())
    }

    /// Censor a model reply; clean text is returned untouched.
    pub fn filter_outbound<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.enabled && self.lexicon.contains_profanity(text) {
            tracing::warn!("Profanity detected in model reply, censoring");
            Cow::Owned(self.lexicon.censor(text))
        } else {
            Cow::Borrowed(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn filter() -> ContentFilter {
        ContentFilter::from_config(&FilterConfig::default()).unwrap()
    }

    #[test_case("", ValidationFailure::Empty ; "empty")]
    #[test_case("   \n\t", ValidationFailure::Empty ; "whitespace only")]
    #[test_case(&"x".repeat(4001), ValidationFailure::TooLong { len: 4001, max: 4000 } ; "too long")]
    #[test_case("fuck this shit", ValidationFailure::Profanity ; "english profanity")]
    #[test_case("ну ты СУКА", ValidationFailure::Profanity ; "russian profanity")]
    fn rejects(text: &str, expected: ValidationFailure) {
        assert_eq!(filter().validate_inbound(text), Err(expected));
    }

    #[test_case("hello" ; "plain")]
    #[test_case(&"x".repeat(4000) ; "exactly at limit")]
    #[test_case("Shitake mushrooms are tasty" ; "no false positive on substrings")]
    #[test_case("Привет, как дела?" ; "cyrillic")]
    fn accepts(text: &str) {
        assert_eq!(filter().validate_inbound(text), Ok(()));
    }

    #[test]
    fn limit_counts_characters() {
        let text = "ж".repeat(4000);
        assert!(text.len() > 4000);
        assert!(filter().validate_inbound(&text).is_ok());
    }

    #[test]
    fn censor_masks_whole_words() {
        let out = filter().filter_outbound("This is a fucking response");
        assert_eq!(out, "This is a ******* response");
    }

    #[test]
    fn clean_reply_is_borrowed() {
        let out = filter().filter_outbound("All good here");
        assert!(matches!(out, Cow::Borrowed("All good here")));
    }

    #[test]
    fn extra_words_are_honored() {
        let config = FilterConfig {
            extra_words: vec!["durak".into()],
            ..FilterConfig::default()
        };
        let filter = ContentFilter::from_config(&config).unwrap();
        assert_eq!(
            filter.validate_inbound("ty durak"),
            Err(ValidationFailure::Profanity)
        );
    }

    #[test]
    fn disabled_filter_only_checks_shape() {
        let config = FilterConfig {
            enabled: false,
            ..FilterConfig::default()
        };
        let filter = ContentFilter::from_config(&config).unwrap();
        assert!(filter.validate_inbound("shit").is_ok());
        assert_eq!(filter.filter_outbound("shit"), "shit");
        assert_eq!(filter.validate_inbound(""), Err(ValidationFailure::Empty));
    }

    #[test]
    fn failure_messages_are_localized() {
        let failure = ValidationFailure::TooLong { len: 5000, max: 4000 };
        assert!(failure.user_message(Language::En).contains("4000"));
        assert!(failure.user_message(Language::Ru).contains("4000"));
    }

    struct Never;

    impl ProfanityLexicon for Never {
        fn contains_profanity(&self, _: &str) -> bool {
            false
        }
        fn censor(&self, text: &str) -> String {
            text.to_string()
        }
    }

    #[test]
    fn custom_lexicon_plugs_in() {
        let filter = ContentFilter::new(10, Arc::new(Never));
        assert!(filter.validate_inbound("fuck").is_ok());
        assert!(filter.validate_inbound("eleven char").is_err());
    }
}
