//! GreenWatch client core
//!
//! Wires the member crates into one set of services the app holds for its
//! whole lifetime: durable storage, the session, the active locale, the
//! location cache, the alert channel, and the API client.
//!
//! ```no_run
//! use std::sync::Arc;
//! use app_state::Alert;
//! use greenwatch::{bootstrap, init_tracing, AppConfig};
//! # use app_platform::{Accuracy, Coordinates, LocationError, LocationProvider};
//! # struct Gps;
//! # #[async_trait::async_trait]
//! # impl LocationProvider for Gps {
//! #     async fn current_position(&self, _: Accuracy) -> Result<Coordinates, LocationError> {
//! #         Err(LocationError::PermissionDenied)
//! #     }
//! # }
//!
//! # async fn run() -> Result<(), greenwatch::AppError> {
//! init_tracing("info");
//! let services = bootstrap(
//!     AppConfig::new("https://api.example.com"),
//!     Arc::new(Gps),
//!     Arc::new(|alert: Alert| println!("{}: {}", alert.title(), alert.message())),
//!     Arc::new(|| println!("navigate to login")),
//! )
//! .await?;
//! let stations = services.client.get("/stations").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;

use app_platform::{LocationCache, LocationConfig, LocationProvider};
use app_state::{AlertChannel, DisplayFn, LocaleState, SessionError, SessionStore};
use i18n::{I18nError, Language, Translator};
use networking::{ApiClient, ApiError, ClientConfig, LoginRedirect};
use storage::{KvConfig, KvError, KvStore};
use thiserror::Error;

/// Errors raised while starting or running the app services
#[derive(Debug, Error)]
pub enum AppError {
    /// Durable storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] KvError),

    /// Session store failed
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Localized messages could not be loaded
    #[error("Localization error: {0}")]
    I18n(#[from] I18nError),

    /// Backend request failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Result type for app-level operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Configuration for [`bootstrap`]
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Durable key-value store
    pub storage: KvConfig,
    /// API client
    pub client: ClientConfig,
    /// Location cache
    pub location: LocationConfig,
    /// Language used until the user picks one
    pub default_language: Language,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: KvConfig::default(),
            client: ClientConfig::default(),
            location: LocationConfig::default(),
            default_language: Language::default(),
        }
    }
}

impl AppConfig {
    /// Create a config for the given backend
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: ClientConfig::new(base_url), ..Default::default() }
    }

    /// Set the on-disk location of the key-value store
    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage.path = path.into();
        self
    }

    /// Set the storage configuration
    pub fn with_storage(mut self, storage: KvConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Set the client configuration
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Set the location cache configuration
    pub fn with_location(mut self, location: LocationConfig) -> Self {
        self.location = location;
        self
    }

    /// Set the language used until the user picks one
    pub fn with_default_language(mut self, language: Language) -> Self {
        self.default_language = language;
        self
    }
}

/// Services shared by the whole app
#[derive(Debug, Clone)]
pub struct AppServices {
    /// Durable key-value store
    pub kv: KvStore,
    /// Persisted session
    pub session: Arc<SessionStore>,
    /// Active language
    pub locale: Arc<LocaleState>,
    /// Device position cache
    pub location: Arc<LocationCache>,
    /// Global alert channel
    pub alerts: Arc<AlertChannel>,
    /// Backend client
    pub client: ApiClient,
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins over `default_directive`. Calling this again is a no-op.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Open storage and build every service
///
/// `display` renders alerts; `login_redirect` runs when the user
/// acknowledges an alert that ended the session.
pub async fn bootstrap(
    config: AppConfig,
    provider: Arc<dyn LocationProvider>,
    display: DisplayFn,
    login_redirect: LoginRedirect,
) -> Result<AppServices> {
    let kv = KvStore::open(config.storage)?;

    let session = Arc::new(SessionStore::new(kv.clone()));
    let restored = session.load_session().await?;

    let locale = Arc::new(LocaleState::load_or(kv.clone(), config.default_language));

    let alerts = Arc::new(AlertChannel::new(Translator::new()?, Arc::clone(&locale)));
    alerts.init(display);

    let location = Arc::new(LocationCache::with_config(provider, config.location));

    let client = ApiClient::builder(config.client, Arc::clone(&session), Arc::clone(&alerts))
        .locale(Arc::clone(&locale))
        .location(Arc::clone(&location))
        .on_login_required(login_redirect)
        .build()?;

    tracing::info!(
        authenticated = restored.is_some(),
        language = %locale.current(),
        base_url = %client.base_url(),
        "services ready"
    );

    Ok(AppServices { kv, session, locale, location, alerts, client })
}
