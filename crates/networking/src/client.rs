//! Backend API client
//!
//! Every request goes through [`ApiClient::send`], which runs the same
//! sequence for each attempt: attach headers, dispatch, and on failure ask
//! the [`ErrorRouter`] whether to retry, reject, or escalate.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use app_platform::LocationCache;
use app_state::{AlertChannel, LocaleState, SessionStore};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client as ReqwestClient};

use crate::error::ApiError;
use crate::request::{ApiResponse, RequestContext};
use crate::retry::RetryPolicy;
use crate::router::{Disposition, ErrorRouter, LoginRedirect};
use crate::Result;

const LANGUAGE_HEADER: &str = "x-Language";
const LOCATION_HEADER: &str = "x-location";
const JSON: &str = "application/json";

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined to
    pub base_url: String,
    /// Absolute timeout for a single dispatch
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Headers added to every request
    pub default_headers: HashMap<String, String>,
    /// Path suffixes of initial-login endpoints
    pub login_paths: Vec<String>,
    /// Retry and backoff policy
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(15),
            user_agent: format!("GreenWatch/{}", env!("CARGO_PKG_VERSION")),
            default_headers: HashMap::new(),
            login_paths: vec!["/auth/login".to_string()],
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Create a config with a base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Default::default() }
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a default header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Treat another path as an initial-login endpoint
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_paths.push(path.into());
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// =============================================================================
// Client Builder
// =============================================================================

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    config: ClientConfig,
    session: Arc<SessionStore>,
    alerts: Arc<AlertChannel>,
    locale: Option<Arc<LocaleState>>,
    location: Option<Arc<LocationCache>>,
    login_redirect: Option<LoginRedirect>,
}

impl ApiClientBuilder {
    /// Read the `x-Language` header from this locale state
    ///
    /// Without it, the default language is sent.
    pub fn locale(mut self, locale: Arc<LocaleState>) -> Self {
        self.locale = Some(locale);
        self
    }

    /// Fill the `x-location` header from this cache
    ///
    /// Without it, the header is omitted.
    pub fn location(mut self, location: Arc<LocationCache>) -> Self {
        self.location = Some(location);
        self
    }

    /// Called when the user acknowledges a session-ending alert
    pub fn on_login_required(mut self, redirect: LoginRedirect) -> Self {
        self.login_redirect = Some(redirect);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient> {
        let http = ReqwestClient::builder()
            .timeout(self.config.timeout)
            .redirect(redirect::Policy::none())
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;

        let login_redirect = self.login_redirect.unwrap_or_else(|| {
            Arc::new(|| tracing::warn!("login required but no redirect handler is registered"))
        });

        let router = ErrorRouter::new(
            self.config.retry.clone(),
            self.config.login_paths.clone(),
            Arc::clone(&self.session),
            Arc::clone(&self.alerts),
            login_redirect,
        );

        Ok(ApiClient {
            http,
            config: self.config,
            session: self.session,
            locale: self.locale.unwrap_or_default(),
            location: self.location,
            router: Arc::new(router),
        })
    }
}

// =============================================================================
// API Client
// =============================================================================

/// Client for the GreenWatch backend
///
/// Cheap to clone; clones share the connection pool and all state.
#[derive(Clone)]
pub struct ApiClient {
    http: ReqwestClient,
    config: ClientConfig,
    session: Arc<SessionStore>,
    locale: Arc<LocaleState>,
    location: Option<Arc<LocationCache>>,
    router: Arc<ErrorRouter>,
}

impl ApiClient {
    /// Start building a client
    pub fn builder(
        config: ClientConfig,
        session: Arc<SessionStore>,
        alerts: Arc<AlertChannel>,
    ) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            session,
            alerts,
            locale: None,
            location: None,
            login_redirect: None,
        }
    }

    /// Send a request through the pipeline
    ///
    /// Resolves with the raw response for any status in 200..=399. Redirects
    /// are not followed. Failures are retried per the retry policy; the
    /// final error is returned unchanged, with the server payload intact.
    pub async fn send(&self, mut ctx: RequestContext) -> Result<ApiResponse> {
        loop {
            self.attach_headers(&mut ctx).await;

            tracing::debug!(
                method = ctx.method().as_str(),
                url = %ctx.url(),
                attempt = ctx.retry_count(),
                "dispatching request"
            );

            let error = match self.dispatch(&ctx).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match self.router.route(&error, &ctx).await {
                Disposition::Retry(delay) => {
                    ctx.record_retry();
                    tokio::time::sleep(delay).await;
                }
                Disposition::Reject => return Err(error),
            }
        }
    }

    /// GET a path
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(RequestContext::get(path)).await
    }

    /// POST a JSON body
    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let ctx = RequestContext::post(path)
            .json_body(body)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.send(ctx).await
    }

    /// PUT a JSON body
    pub async fn put_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let ctx = RequestContext::put(path)
            .json_body(body)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.send(ctx).await
    }

    /// DELETE a path
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(RequestContext::delete(path)).await
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Session store the client reads tokens from
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Router deciding the fate of failed requests
    pub fn router(&self) -> &ErrorRouter {
        &self.router
    }

    async fn attach_headers(&self, ctx: &mut RequestContext) {
        match self.session.get_token().await {
            Ok(Some(token)) => ctx.set_header("Authorization", format!("Bearer {}", token)),
            Ok(None) => {
                ctx.remove_header("Authorization");
            }
            Err(err) => {
                tracing::warn!(error = %err, "session unreadable, sending without token");
                ctx.remove_header("Authorization");
            }
        }

        ctx.set_header(LANGUAGE_HEADER, self.locale.current().code());

        if let Some(cache) = &self.location {
            let location = cache.get_location().await;
            match location.coordinates.to_header_value() {
                Ok(value) => ctx.set_header(LOCATION_HEADER, value),
                Err(err) => tracing::warn!(error = %err, "location not serializable"),
            }
        }

        if ctx.header_value("content-type").is_none() {
            ctx.set_header("Content-Type", JSON);
        }
        ctx.set_header("Accept", JSON);
    }

    async fn dispatch(&self, ctx: &RequestContext) -> Result<ApiResponse> {
        let url = self.resolve_url(ctx.url());
        let mut req = self.http.request(ctx.method().into(), &url);

        if !ctx.params().is_empty() {
            req = req.query(ctx.params());
        }

        req = req.headers(self.merged_headers(ctx)?);

        if let Some(body) = ctx.body_bytes() {
            req = req.body(body.to_vec());
        }

        let response = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(key.to_string(), value_str.to_string());
            }
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?.to_vec();

        if (200..=399).contains(&status) {
            Ok(ApiResponse::new(status, headers, body))
        } else {
            tracing::debug!(url = %url, status, "request failed with status");
            Err(ApiError::from_response(status, &body))
        }
    }

    /// Default headers overlaid by the request's own, one value per name
    fn merged_headers(&self, ctx: &RequestContext) -> Result<HeaderMap> {
        let mut merged = HeaderMap::new();
        let pairs = self.config.default_headers.iter().chain(ctx.headers());
        for (key, value) in pairs {
            let name = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes())
                .map_err(|e| ApiError::InvalidRequest(format!("header {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::InvalidRequest(format!("header {key}: {e}")))?;
            merged.insert(name, value);
        }
        Ok(merged)
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.config.timeout)
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("router", &self.router)
            .finish()
    }
}

// =============================================================================
// Client Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use i18n::Translator;
    use storage::KvStore;

    fn client(config: ClientConfig) -> ApiClient {
        let session = Arc::new(SessionStore::new(KvStore::in_memory().unwrap()));
        let alerts = Arc::new(AlertChannel::new(
            Translator::new().unwrap(),
            Arc::new(LocaleState::default()),
        ));
        ApiClient::builder(config, session, alerts).build().unwrap()
    }

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.login_paths, vec!["/auth/login".to_string()]);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.user_agent.starts_with("GreenWatch/"));
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("https://api.example.com")
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("TestAgent/1.0")
            .with_header("X-App-Build", "42")
            .with_login_path("/auth/register")
            .with_retry(RetryPolicy::new(0));

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "TestAgent/1.0");
        assert_eq!(config.default_headers.get("X-App-Build"), Some(&"42".to_string()));
        assert_eq!(config.login_paths.len(), 2);
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_resolve_url() {
        let client = client(ClientConfig::new("https://api.example.com/v1/"));
        assert_eq!(client.resolve_url("/profile"), "https://api.example.com/v1/profile");
        assert_eq!(client.resolve_url("profile"), "https://api.example.com/v1/profile");
        assert_eq!(client.resolve_url("https://cdn.example.com/a"), "https://cdn.example.com/a");
    }

    #[tokio::test]
    async fn test_attach_headers_without_session() {
        let client = client(ClientConfig::default());
        let mut ctx = RequestContext::get("/stations").header("Authorization", "Bearer stale");

        client.attach_headers(&mut ctx).await;

        assert!(ctx.header_value("authorization").is_none());
        assert_eq!(ctx.header_value("x-language"), Some("vi"));
        assert_eq!(ctx.header_value("accept"), Some("application/json"));
        assert_eq!(ctx.header_value("content-type"), Some("application/json"));
        assert!(ctx.header_value("x-location").is_none());
    }

    #[tokio::test]
    async fn test_attach_headers_with_session() {
        let client = client(ClientConfig::default());
        client.session().save_token("abc").await.unwrap();
        let mut ctx = RequestContext::get("/stations");

        client.attach_headers(&mut ctx).await;
        assert_eq!(ctx.header_value("authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_explicit_content_type_is_kept() {
        let client = client(ClientConfig::default());
        let mut ctx = RequestContext::post("/upload").header("Content-Type", "image/jpeg");

        client.attach_headers(&mut ctx).await;
        assert_eq!(ctx.header_value("content-type"), Some("image/jpeg"));
    }

    #[test]
    fn test_client_accessors() {
        let client = client(ClientConfig::default().with_timeout(Duration::from_secs(3)));
        assert_eq!(client.config().timeout, Duration::from_secs(3));
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
