//! Internationalization for GreenWatch
//!
//! This crate provides the supported language list, locale negotiation,
//! and the localized strings used by global alerts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lang;
pub mod translator;

pub use lang::Language;
pub use translator::{I18nError, MessageKey, Translator};
