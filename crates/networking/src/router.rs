//! Error classification and routing
//!
//! Decides what happens to a failed request: send it again, hand it back to
//! the caller, or escalate it to the alert channel (tearing down the session
//! on the way for authorization and timeout failures).

use std::sync::Arc;
use std::time::Duration;

use app_state::{AlertChannel, AlertKind, ConfirmAction, SessionStore};

use crate::error::{ApiError, ErrorClass};
use crate::request::RequestContext;
use crate::retry::RetryPolicy;

/// Navigates the app to its login entry point
pub type LoginRedirect = Arc<dyn Fn() + Send + Sync>;

/// What the pipeline should do with a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Send the request again after the delay
    Retry(Duration),
    /// Hand the error back to the caller
    Reject,
}

/// Routes failed requests to retry, rejection, or global escalation
pub struct ErrorRouter {
    policy: RetryPolicy,
    login_paths: Vec<String>,
    session: Arc<SessionStore>,
    alerts: Arc<AlertChannel>,
    login_redirect: LoginRedirect,
}

impl ErrorRouter {
    /// Create a router
    pub fn new(
        policy: RetryPolicy,
        login_paths: Vec<String>,
        session: Arc<SessionStore>,
        alerts: Arc<AlertChannel>,
        login_redirect: LoginRedirect,
    ) -> Self {
        Self { policy, login_paths, session, alerts, login_redirect }
    }

    /// Retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Whether the request targets an initial-login endpoint
    pub fn is_login_request(&self, ctx: &RequestContext) -> bool {
        let path = ctx.path();
        self.login_paths.iter().any(|login| path.ends_with(login.as_str()))
    }

    /// Decide the disposition of a failed request
    ///
    /// Escalation side effects (session clear, alert) happen here, before
    /// the rejection is returned.
    pub async fn route(&self, error: &ApiError, ctx: &RequestContext) -> Disposition {
        let class = error.class();

        // A failed login attempt stays a local form error.
        if class == ErrorClass::Authorization && self.is_login_request(ctx) {
            tracing::debug!(
                url = %ctx.url(),
                status = ?error.status(),
                "login request rejected, not escalating"
            );
            return Disposition::Reject;
        }

        let decision = self.policy.decide(error, ctx.retry_count());
        if decision.should_retry {
            tracing::info!(
                url = %ctx.url(),
                attempt = ctx.retry_count() + 1,
                delay_ms = decision.delay.as_millis() as u64,
                error = %error,
                "retry scheduled"
            );
            return Disposition::Retry(decision.delay);
        }

        match class {
            ErrorClass::TransientNetwork => {
                tracing::warn!(url = %ctx.url(), error = %error, "no response after retries");
                self.clear_session().await;
                self.alerts.show_timeout_error(self.redirect_action());
            }
            ErrorClass::Authorization => {
                tracing::warn!(url = %ctx.url(), status = ?error.status(), "authorization failed");
                self.clear_session().await;
                let kind = match error.status() {
                    Some(403) => AlertKind::AccessDenied,
                    _ => AlertKind::SessionExpired,
                };
                self.alerts.show(kind, self.redirect_action());
            }
            ErrorClass::Validation => {
                tracing::debug!(url = %ctx.url(), "validation failed");
            }
            ErrorClass::TransientServer | ErrorClass::TerminalUnknown => {
                tracing::warn!(
                    url = %ctx.url(),
                    attempts = ctx.retry_count() + 1,
                    error = %error,
                    "request failed"
                );
            }
        }

        Disposition::Reject
    }

    async fn clear_session(&self) {
        if let Err(err) = self.session.clear().await {
            tracing::error!(error = %err, "failed to erase stored session");
        }
    }

    fn redirect_action(&self) -> ConfirmAction {
        let redirect = Arc::clone(&self.login_redirect);
        Box::new(move || redirect())
    }
}

impl std::fmt::Debug for ErrorRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRouter")
            .field("policy", &self.policy)
            .field("login_paths", &self.login_paths)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_state::{Alert, LocaleState};
    use i18n::Translator;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::KvStore;

    struct Harness {
        router: ErrorRouter,
        session: Arc<SessionStore>,
        alerts: Arc<AlertChannel>,
        shown: Arc<Mutex<Vec<Alert>>>,
        redirects: Arc<AtomicUsize>,
    }

    async fn harness() -> Harness {
        let session = Arc::new(SessionStore::new(KvStore::in_memory().unwrap()));
        session.save_token("token-1").await.unwrap();

        let alerts = Arc::new(AlertChannel::new(
            Translator::new().unwrap(),
            Arc::new(LocaleState::default()),
        ));
        let shown = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&shown);
        alerts.init(Arc::new(move |alert: Alert| sink.lock().push(alert)));

        let redirects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&redirects);
        let router = ErrorRouter::new(
            RetryPolicy::default(),
            vec!["/auth/login".to_string()],
            Arc::clone(&session),
            Arc::clone(&alerts),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        Harness { router, session, alerts, shown, redirects }
    }

    fn exhausted(url: &str) -> RequestContext {
        let mut ctx = RequestContext::get(url);
        ctx.record_retry();
        ctx.record_retry();
        ctx
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let h = harness().await;
        let ctx = RequestContext::get("/stations");

        let disposition = h.router.route(&ApiError::from_response(503, b""), &ctx).await;
        assert_eq!(disposition, Disposition::Retry(Duration::from_secs(2)));
        assert!(h.shown.lock().is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejects_without_side_effects() {
        let h = harness().await;
        let ctx = RequestContext::post("/reports");

        let disposition = h.router.route(&ApiError::from_response(422, b"{}"), &ctx).await;
        assert_eq!(disposition, Disposition::Reject);
        assert!(h.shown.lock().is_empty());
        assert!(h.session.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_forbidden_escalates_immediately() {
        let h = harness().await;
        let ctx = RequestContext::get("/admin");

        let disposition = h.router.route(&ApiError::from_response(403, b""), &ctx).await;
        assert_eq!(disposition, Disposition::Reject);
        assert!(!h.session.is_authenticated().await.unwrap());

        let shown = h.shown.lock();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].kind(), Some(AlertKind::AccessDenied));
    }

    #[tokio::test]
    async fn test_login_unauthorized_stays_local() {
        let h = harness().await;
        let ctx = RequestContext::post("/auth/login");

        let disposition = h.router.route(&ApiError::from_response(401, b""), &ctx).await;
        assert_eq!(disposition, Disposition::Reject);
        assert!(h.shown.lock().is_empty());
        assert_eq!(h.session.get_token().await.unwrap(), Some("token-1".to_string()));
    }

    #[tokio::test]
    async fn test_exhausted_unauthorized_expires_session() {
        let h = harness().await;

        let disposition =
            h.router.route(&ApiError::from_response(401, b""), &exhausted("/profile")).await;
        assert_eq!(disposition, Disposition::Reject);
        assert_eq!(h.session.get_token().await.unwrap(), None);

        let alert = h.shown.lock().pop().unwrap();
        assert_eq!(alert.kind(), Some(AlertKind::SessionExpired));
        assert!(h.alerts.is_showing(AlertKind::SessionExpired));

        alert.confirm();
        assert_eq!(h.redirects.load(Ordering::SeqCst), 1);
        assert!(!h.alerts.is_showing(AlertKind::SessionExpired));
    }

    #[tokio::test]
    async fn test_exhausted_timeout_shows_timeout_alert() {
        let h = harness().await;
        let error = ApiError::Timeout(Duration::from_secs(15));

        let disposition = h.router.route(&error, &exhausted("/stations")).await;
        assert_eq!(disposition, Disposition::Reject);
        assert!(!h.session.is_authenticated().await.unwrap());

        let shown = h.shown.lock();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].kind(), Some(AlertKind::Timeout));
    }

    #[tokio::test]
    async fn test_exhausted_server_error_is_not_escalated() {
        let h = harness().await;

        let disposition =
            h.router.route(&ApiError::from_response(500, b""), &exhausted("/stations")).await;
        assert_eq!(disposition, Disposition::Reject);
        assert!(h.shown.lock().is_empty());
        assert!(h.session.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_repeated_unauthorized_shows_one_alert() {
        let h = harness().await;
        let error = ApiError::from_response(401, b"");

        for _ in 0..3 {
            h.router.route(&error, &exhausted("/feed")).await;
        }
        assert_eq!(h.shown.lock().len(), 1);
    }

    #[test]
    fn test_login_path_matching() {
        let session = Arc::new(SessionStore::new(KvStore::in_memory().unwrap()));
        let alerts = Arc::new(AlertChannel::new(
            Translator::new().unwrap(),
            Arc::new(LocaleState::default()),
        ));
        let router = ErrorRouter::new(
            RetryPolicy::default(),
            vec!["/auth/login".to_string()],
            session,
            alerts,
            Arc::new(|| {}),
        );

        assert!(router.is_login_request(&RequestContext::post("/auth/login")));
        assert!(router.is_login_request(&RequestContext::post("/api/v1/auth/login?next=1")));
        assert!(router.is_login_request(&RequestContext::post("https://h.example/auth/login")));
        assert!(!router.is_login_request(&RequestContext::get("/profile")));
        assert!(!router.is_login_request(&RequestContext::post("/auth/login/otp")));
    }
}
