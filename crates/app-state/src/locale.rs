//! Active language selection

use i18n::Language;
use parking_lot::RwLock;
use storage::{KvError, KvStore};

const LANGUAGE_KEY: &str = "device:language";

/// The language the user has selected
///
/// Read on every request to fill the `x-Language` header, so reads are a
/// plain in-memory lookup. Changes are persisted when a store is attached.
#[derive(Debug)]
pub struct LocaleState {
    current: RwLock<Language>,
    kv: Option<KvStore>,
}

impl LocaleState {
    /// In-memory locale state, not persisted
    pub fn new(language: Language) -> Self {
        Self { current: RwLock::new(language), kv: None }
    }

    /// Restore the persisted selection, defaulting to Vietnamese
    pub fn load(kv: KvStore) -> Self {
        Self::load_or(kv, Language::default())
    }

    /// Restore the persisted selection, or use `fallback` if there is none
    ///
    /// An unreadable stored value is logged and replaced by `fallback`.
    pub fn load_or(kv: KvStore, fallback: Language) -> Self {
        let language = match kv.get::<Language>(LANGUAGE_KEY) {
            Ok(Some(language)) => language,
            Ok(None) => fallback,
            Err(err) => {
                tracing::warn!(error = %err, "stored language unreadable, using default");
                fallback
            }
        };

        Self { current: RwLock::new(language), kv: Some(kv) }
    }

    /// Currently selected language
    pub fn current(&self) -> Language {
        *self.current.read()
    }

    /// Change the selected language
    pub fn set_language(&self, language: Language) -> Result<(), KvError> {
        *self.current.write() = language;
        if let Some(kv) = &self.kv {
            kv.set(LANGUAGE_KEY, &language)?;
        }
        tracing::debug!(language = %language, "language changed");
        Ok(())
    }
}

impl Default for LocaleState {
    fn default() -> Self {
        Self::new(Language::default())
    }
}
