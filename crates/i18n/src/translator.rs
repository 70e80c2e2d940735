//! Localized message catalog
//!
//! Messages are authored as Fluent resources under `locales/` and rendered
//! once when the [`Translator`] is built. The rendered catalog is plain
//! strings, so a `Translator` can be shared freely across tasks.

use crate::lang::Language;
use fluent::{FluentBundle, FluentResource};
use std::collections::HashMap;
use thiserror::Error;

const VI_RESOURCE: &str = include_str!("../locales/vi.ftl");
const EN_RESOURCE: &str = include_str!("../locales/en.ftl");

/// Errors raised while loading translations
#[derive(Debug, Error)]
pub enum I18nError {
    /// The Fluent source could not be parsed
    #[error("Failed to parse {language} resource: {details}")]
    Parse {
        /// Language whose resource failed
        language: Language,
        /// Parser diagnostics
        details: String,
    },

    /// The resource could not be added to the bundle
    #[error("Failed to load {language} resource: {details}")]
    Bundle {
        /// Language whose resource failed
        language: Language,
        /// Bundle diagnostics
        details: String,
    },
}

/// Result type for i18n operations
pub type Result<T> = std::result::Result<T, I18nError>;

/// Keys of every message the catalog provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Title of the request-timeout alert
    TimeoutTitle,
    /// Body of the request-timeout alert
    TimeoutMessage,
    /// Title of the session-expired alert
    SessionExpiredTitle,
    /// Body of the session-expired alert
    SessionExpiredMessage,
    /// Title of the access-denied alert
    AccessDeniedTitle,
    /// Body of the access-denied alert
    AccessDeniedMessage,
    /// Label of the single acknowledgment button
    Confirm,
}

impl MessageKey {
    /// Every key, in catalog order
    pub const ALL: [MessageKey; 7] = [
        MessageKey::TimeoutTitle,
        MessageKey::TimeoutMessage,
        MessageKey::SessionExpiredTitle,
        MessageKey::SessionExpiredMessage,
        MessageKey::AccessDeniedTitle,
        MessageKey::AccessDeniedMessage,
        MessageKey::Confirm,
    ];

    /// Fluent message identifier
    pub fn id(self) -> &'static str {
        match self {
            MessageKey::TimeoutTitle => "alert-timeout-title",
            MessageKey::TimeoutMessage => "alert-timeout-message",
            MessageKey::SessionExpiredTitle => "alert-session-expired-title",
            MessageKey::SessionExpiredMessage => "alert-session-expired-message",
            MessageKey::AccessDeniedTitle => "alert-access-denied-title",
            MessageKey::AccessDeniedMessage => "alert-access-denied-message",
            MessageKey::Confirm => "alert-confirm",
        }
    }
}

/// Rendered message catalog for all supported languages
#[derive(Debug, Clone)]
pub struct Translator {
    catalog: HashMap<(Language, MessageKey), String>,
}

impl Translator {
    /// Load the bundled translations
    pub fn new() -> Result<Self> {
        let mut catalog = HashMap::new();
        for (language, source) in [(Language::Vietnamese, VI_RESOURCE), (Language::English, EN_RESOURCE)] {
            render_resource(language, source, &mut catalog)?;
        }
        Ok(Self { catalog })
    }

    /// Look up a message
    ///
    /// Missing translations fall back to English, then to the raw message id.
    pub fn translate(&self, language: Language, key: MessageKey) -> String {
        self.catalog
            .get(&(language, key))
            .or_else(|| self.catalog.get(&(Language::English, key)))
            .cloned()
            .unwrap_or_else(|| key.id().to_string())
    }
}

fn render_resource(
    language: Language,
    source: &str,
    catalog: &mut HashMap<(Language, MessageKey), String>,
) -> Result<()> {
    let resource = FluentResource::try_new(source.to_string()).map_err(|(_, errors)| {
        I18nError::Parse { language, details: format!("{:?}", errors) }
    })?;

    let mut bundle = FluentBundle::new(vec![language.langid()]);
    bundle.set_use_isolating(false);
    bundle
        .add_resource(resource)
        .map_err(|errors| I18nError::Bundle { language, details: format!("{:?}", errors) })?;

    for key in MessageKey::ALL {
        let Some(pattern) = bundle.get_message(key.id()).and_then(|msg| msg.value()) else {
            continue;
        };
        let mut errors = Vec::new();
        let text = bundle.format_pattern(pattern, None, &mut errors);
        if errors.is_empty() {
            catalog.insert((language, key), text.into_owned());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_translated_in_every_language() {
        let translator = Translator::new().unwrap();
        for language in Language::ALL {
            for key in MessageKey::ALL {
                assert!(
                    translator.catalog.contains_key(&(language, key)),
                    "missing {} for {}",
                    key.id(),
                    language
                );
            }
        }
    }

    #[test]
    fn test_translate_english() {
        let translator = Translator::new().unwrap();
        assert_eq!(
            translator.translate(Language::English, MessageKey::SessionExpiredTitle),
            "Session expired"
        );
        assert_eq!(translator.translate(Language::English, MessageKey::Confirm), "OK");
    }

    #[test]
    fn test_translate_vietnamese_differs_from_english() {
        let translator = Translator::new().unwrap();
        let vi = translator.translate(Language::Vietnamese, MessageKey::AccessDeniedTitle);
        let en = translator.translate(Language::English, MessageKey::AccessDeniedTitle);
        assert_ne!(vi, en);
        assert!(!vi.is_empty());
    }

    #[test]
    fn test_missing_translation_falls_back() {
        let mut translator = Translator::new().unwrap();
        translator.catalog.remove(&(Language::Vietnamese, MessageKey::Confirm));
        assert_eq!(translator.translate(Language::Vietnamese, MessageKey::Confirm), "OK");

        translator.catalog.remove(&(Language::English, MessageKey::Confirm));
        assert_eq!(translator.translate(Language::Vietnamese, MessageKey::Confirm), "alert-confirm");
    }
}
