//! Global alert channel
//!
//! Non-UI code (the request pipeline) uses an [`AlertChannel`] to ask the UI
//! to show a modal without holding a reference to any screen. The UI
//! registers a display function once at startup with [`AlertChannel::init`]
//! and receives each [`Alert`] by value; it calls [`Alert::confirm`] when the
//! user taps the single acknowledgment button.
//!
//! # Reentrancy guard
//!
//! The escalation alerts (timeout, session expired, access denied) share one
//! guard for the whole app. It moves `Idle -> Showing` when an escalation is
//! handed to the UI and back to `Idle` when that alert is confirmed or
//! dropped. While it is `Showing`, every further escalation of any kind is
//! suppressed, so a burst of failing requests produces one modal. Ad-hoc
//! alerts from [`AlertChannel::show_error`] bypass the guard.

use i18n::{Language, MessageKey, Translator};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::locale::LocaleState;

/// Action run when the user acknowledges an alert
pub type ConfirmAction = Box<dyn FnOnce() + Send>;

/// Function that renders an alert in the UI
pub type DisplayFn = Arc<dyn Fn(Alert) + Send + Sync>;

/// Escalation kinds raised by the error router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// The session token was rejected (401)
    SessionExpired,
    /// The user may not perform the action (403)
    AccessDenied,
    /// The server did not answer in time
    Timeout,
}

impl AlertKind {
    fn messages(self) -> (MessageKey, MessageKey) {
        match self {
            AlertKind::SessionExpired => {
                (MessageKey::SessionExpiredTitle, MessageKey::SessionExpiredMessage)
            }
            AlertKind::AccessDenied => {
                (MessageKey::AccessDeniedTitle, MessageKey::AccessDeniedMessage)
            }
            AlertKind::Timeout => (MessageKey::TimeoutTitle, MessageKey::TimeoutMessage),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GuardState {
    #[default]
    Idle,
    Showing(AlertKind),
}

type Guard = Arc<Mutex<GuardState>>;

/// An alert handed to the UI
pub struct Alert {
    kind: Option<AlertKind>,
    title: String,
    message: String,
    confirm_label: String,
    on_confirm: Option<ConfirmAction>,
    guard: Option<Guard>,
}

impl Alert {
    /// Escalation kind, `None` for ad-hoc alerts
    pub fn kind(&self) -> Option<AlertKind> {
        self.kind
    }

    /// Title text
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Body text
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Localized label for the acknowledgment button
    pub fn confirm_label(&self) -> &str {
        &self.confirm_label
    }

    /// Acknowledge the alert
    ///
    /// Releases the escalation guard, then runs the confirmation action.
    pub fn confirm(mut self) {
        self.release();
        tracing::debug!(kind = ?self.kind, "alert acknowledged");
        if let Some(action) = self.on_confirm.take() {
            action();
        }
    }

    fn release(&mut self) {
        if let Some(guard) = self.guard.take() {
            *guard.lock() = GuardState::Idle;
        }
    }
}

impl Drop for Alert {
    // An alert discarded without confirmation must not block later escalations.
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::debug!(kind = ?self.kind, "alert dropped without confirmation");
            self.release();
        }
    }
}

impl std::fmt::Debug for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alert")
            .field("kind", &self.kind)
            .field("title", &self.title)
            .field("message", &self.message)
            .finish()
    }
}

/// Process-wide publish point for UI alerts
///
/// Create one at startup and share it by `Arc` with everything that may need
/// to raise an alert.
pub struct AlertChannel {
    display: RwLock<Option<DisplayFn>>,
    guard: Guard,
    translator: Translator,
    locale: Arc<LocaleState>,
}

impl AlertChannel {
    /// Create a channel with no display function registered
    pub fn new(translator: Translator, locale: Arc<LocaleState>) -> Self {
        Self {
            display: RwLock::new(None),
            guard: Arc::new(Mutex::new(GuardState::Idle)),
            translator,
            locale,
        }
    }

    /// Register the function that renders alerts
    ///
    /// Replaces any previously registered function.
    pub fn init(&self, display: DisplayFn) {
        *self.display.write() = Some(display);
        tracing::debug!("alert display registered");
    }

    /// Whether a display function has been registered
    pub fn is_initialized(&self) -> bool {
        self.display.read().is_some()
    }

    /// Whether an alert of this kind is waiting for acknowledgment
    pub fn is_showing(&self, kind: AlertKind) -> bool {
        *self.guard.lock() == GuardState::Showing(kind)
    }

    /// Escalation alert currently waiting for acknowledgment, if any
    pub fn active(&self) -> Option<AlertKind> {
        match *self.guard.lock() {
            GuardState::Idle => None,
            GuardState::Showing(kind) => Some(kind),
        }
    }

    /// Show an ad-hoc alert
    ///
    /// Not guarded. Returns `false` when no display function is registered.
    pub fn show_error(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        on_confirm: ConfirmAction,
    ) -> bool {
        let Some(display) = self.display() else {
            tracing::warn!("alert requested before a display was registered");
            return false;
        };

        display(Alert {
            kind: None,
            title: title.into(),
            message: message.into(),
            confirm_label: self.text(MessageKey::Confirm),
            on_confirm: Some(on_confirm),
            guard: None,
        });
        true
    }

    /// Show the localized request-timeout alert
    pub fn show_timeout_error(&self, on_confirm: ConfirmAction) -> bool {
        self.show_guarded(AlertKind::Timeout, on_confirm)
    }

    /// Show the localized session-expired alert
    pub fn show_session_expired(&self, on_confirm: ConfirmAction) -> bool {
        self.show_guarded(AlertKind::SessionExpired, on_confirm)
    }

    /// Show the localized access-denied alert
    pub fn show_access_denied(&self, on_confirm: ConfirmAction) -> bool {
        self.show_guarded(AlertKind::AccessDenied, on_confirm)
    }

    /// Show an escalation alert, unless one is already showing
    ///
    /// Returns `true` if the alert was handed to the display function.
    pub fn show(&self, kind: AlertKind, on_confirm: ConfirmAction) -> bool {
        self.show_guarded(kind, on_confirm)
    }

    fn show_guarded(&self, kind: AlertKind, on_confirm: ConfirmAction) -> bool {
        let Some(display) = self.display() else {
            tracing::warn!(?kind, "alert requested before a display was registered");
            return false;
        };

        {
            let mut state = self.guard.lock();
            if let GuardState::Showing(active) = *state {
                tracing::debug!(?kind, ?active, "alert already showing, suppressed");
                return false;
            }
            *state = GuardState::Showing(kind);
        }

        let (title, message) = kind.messages();
        let alert = Alert {
            kind: Some(kind),
            title: self.text(title),
            message: self.text(message),
            confirm_label: self.text(MessageKey::Confirm),
            on_confirm: Some(on_confirm),
            guard: Some(self.guard.clone()),
        };

        tracing::info!(?kind, "showing alert");
        // No lock is held here: the display may confirm synchronously.
        display(alert);
        true
    }

    fn display(&self) -> Option<DisplayFn> {
        self.display.read().clone()
    }

    fn text(&self, key: MessageKey) -> String {
        self.translator.translate(self.language(), key)
    }

    fn language(&self) -> Language {
        self.locale.current()
    }
}

impl std::fmt::Debug for AlertChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertChannel")
            .field("initialized", &self.is_initialized())
            .field("guard", &*self.guard.lock())
            .finish()
    }
}
