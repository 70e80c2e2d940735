//! Application state for GreenWatch
//!
//! This crate holds the process-wide state the request pipeline consults:
//! the persisted session, the active locale, and the alert channel that lets
//! non-UI code ask the UI to show a modal.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alerts;
pub mod locale;
pub mod session;

pub use alerts::{Alert, AlertChannel, AlertKind, ConfirmAction, DisplayFn};
pub use locale::LocaleState;
pub use session::{Session, SessionError, SessionStore, UserProfile};
