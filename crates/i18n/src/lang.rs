//! Supported languages and locale negotiation

use fluent_langneg::{
    convert_vec_str_to_langids_lossy, negotiate_languages, LanguageIdentifier as NegotiatedId,
    NegotiationStrategy,
};
use serde::{Deserialize, Serialize};
use unic_langid::LanguageIdentifier;

/// A language the app ships translations for
///
/// Serialized as its locale code, which is also the value sent to the
/// backend in the `x-Language` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    /// Vietnamese (default)
    #[default]
    #[serde(rename = "vi")]
    Vietnamese,
    /// English
    #[serde(rename = "en")]
    English,
}

impl Language {
    /// All supported languages, default first
    pub const ALL: [Language; 2] = [Language::Vietnamese, Language::English];

    /// Locale code (e.g. "vi")
    pub fn code(self) -> &'static str {
        match self {
            Language::Vietnamese => "vi",
            Language::English => "en",
        }
    }

    /// Parse a locale code, accepting region-qualified tags like "en-US"
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code.split(['-', '_']).next()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|lang| lang.code() == primary)
    }

    /// Unicode language identifier for this language
    pub fn langid(self) -> LanguageIdentifier {
        self.code().parse().unwrap_or_default()
    }

    /// Pick the best supported language for a list of requested locales
    ///
    /// Falls back to the default language when nothing matches.
    pub fn negotiate<S: AsRef<str>>(requested: &[S]) -> Self {
        let requested = convert_vec_str_to_langids_lossy(requested.iter().map(|s| s.as_ref()));
        let available: Vec<NegotiatedId> =
            Self::ALL.iter().filter_map(|l| l.code().parse().ok()).collect();
        let default: Option<NegotiatedId> = Self::default().code().parse().ok();

        let supported = negotiate_languages(
            &requested,
            &available,
            default.as_ref(),
            NegotiationStrategy::Filtering,
        );

        supported
            .first()
            .and_then(|chosen| Self::from_code(&chosen.to_string()))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
