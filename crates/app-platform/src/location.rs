//! Device location with a time-to-live cache
//!
//! Every outbound request carries a best-effort position header. Asking the
//! device for a fix on each request would be slow and battery hungry, so the
//! [`LocationCache`] memoizes the last answer for a fixed window and falls
//! back to a default city when the device cannot answer quickly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Errors reported by a location provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
    /// The user has not granted location access
    #[error("Location permission denied")]
    PermissionDenied,

    /// The device could not produce a position
    #[error("Location unavailable: {0}")]
    Unavailable(String),
}

/// Requested accuracy for a device query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    /// Coarse, network-based position
    #[default]
    Low,
    /// Balanced power and accuracy
    Balanced,
    /// GPS-grade position
    High,
}

/// A latitude/longitude pair
///
/// Serializes as `{"lat": .., "long": ..}`, the shape the backend expects
/// in the `x-location` header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub long: f64,
}

impl Coordinates {
    /// Create a new coordinate pair
    pub const fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }

    /// Ho Chi Minh City, used when the device gives no answer
    pub const DEFAULT_CITY: Coordinates = Coordinates::new(10.8231, 106.6297);

    /// Serialize for the `x-location` header
    pub fn to_header_value(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A cached position and when it was captured
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// The position
    pub coordinates: Coordinates,
    /// When the position was resolved
    pub captured_at: Instant,
    /// Whether this is the fallback rather than a device fix
    pub is_fallback: bool,
}

impl Location {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.captured_at.elapsed() < ttl
    }
}

/// Source of device positions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Query the device for its current position
    async fn current_position(&self, accuracy: Accuracy) -> Result<Coordinates, LocationError>;
}

/// Location cache configuration
#[derive(Debug, Clone)]
pub struct LocationConfig {
    /// How long a resolved position is reused
    pub ttl: Duration,
    /// Upper bound on a single device query
    pub query_timeout: Duration,
    /// Accuracy requested from the device
    pub accuracy: Accuracy,
    /// Position used when the device query fails or times out
    pub fallback: Coordinates,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            query_timeout: Duration::from_secs(1),
            accuracy: Accuracy::Low,
            fallback: Coordinates::DEFAULT_CITY,
        }
    }
}

impl LocationConfig {
    /// Set the cache time-to-live
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the device query timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the requested accuracy
    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Set the fallback position
    pub fn with_fallback(mut self, fallback: Coordinates) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Time-to-live cache in front of a [`LocationProvider`]
///
/// The cache lock is held while a device query is in flight, so callers
/// that arrive during the query wait for it and share its result instead
/// of starting their own.
pub struct LocationCache {
    provider: Arc<dyn LocationProvider>,
    config: LocationConfig,
    cached: Mutex<Option<Location>>,
}

impl LocationCache {
    /// Create a cache with the default configuration
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self::with_config(provider, LocationConfig::default())
    }

    /// Create a cache with a custom configuration
    pub fn with_config(provider: Arc<dyn LocationProvider>, config: LocationConfig) -> Self {
        Self { provider, config, cached: Mutex::new(None) }
    }

    /// Get the configuration
    pub fn config(&self) -> &LocationConfig {
        &self.config
    }

    /// Current position, querying the device only when the cache is stale
    ///
    /// Never fails: a failed or slow query yields the fallback position,
    /// which is cached like a real fix.
    pub async fn get_location(&self) -> Location {
        let mut cached = self.cached.lock().await;

        if let Some(location) = cached.as_ref() {
            if location.is_fresh(self.config.ttl) {
                return *location;
            }
        }

        let location = self.query_device().await;
        *cached = Some(location);
        location
    }

    /// Cached position if still fresh, without touching the device
    pub async fn peek(&self) -> Option<Location> {
        let cached = self.cached.lock().await;
        (*cached).filter(|location| location.is_fresh(self.config.ttl))
    }

    /// Drop the cached position so the next call queries the device
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn query_device(&self) -> Location {
        let query = self.provider.current_position(self.config.accuracy);

        let (coordinates, is_fallback) =
            match tokio::time::timeout(self.config.query_timeout, query).await {
                Ok(Ok(coordinates)) => (coordinates, false),
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "location query failed, using fallback");
                    (self.config.fallback, true)
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.config.query_timeout.as_millis() as u64,
                        "location query timed out, using fallback"
                    );
                    (self.config.fallback, true)
                }
            };

        Location { coordinates, captured_at: Instant::now(), is_fallback }
    }
}

impl std::fmt::Debug for LocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationCache").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HANOI: Coordinates = Coordinates::new(21.0285, 105.8542);

    struct SlowProvider {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LocationProvider for SlowProvider {
        async fn current_position(&self, _: Accuracy) -> Result<Coordinates, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(HANOI)
        }
    }

    #[test]
    fn test_header_value_shape() {
        let value = Coordinates::new(1.5, 2.25).to_header_value().unwrap();
        assert_eq!(value, r#"{"lat":1.5,"long":2.25}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_value_is_reused() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_current_position()
            .withf(|accuracy| *accuracy == Accuracy::Low)
            .times(1)
            .returning(|_| Ok(HANOI));

        let cache = LocationCache::new(Arc::new(provider));

        let first = cache.get_location().await;
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        let second = cache.get_location().await;

        assert_eq!(first.coordinates, HANOI);
        assert!(!first.is_fallback);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_value_is_refreshed() {
        let mut provider = MockLocationProvider::new();
        provider.expect_current_position().times(2).returning(|_| Ok(HANOI));

        let cache = LocationCache::new(Arc::new(provider));

        let first = cache.get_location().await;
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        let second = cache.get_location().await;

        assert!(second.captured_at > first.captured_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_uses_fallback_and_caches_it() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_current_position()
            .times(1)
            .returning(|_| Err(LocationError::PermissionDenied));

        let cache = LocationCache::new(Arc::new(provider));

        let first = cache.get_location().await;
        assert!(first.is_fallback);
        assert_eq!(first.coordinates, Coordinates::DEFAULT_CITY);

        tokio::time::advance(Duration::from_secs(60)).await;
        let second = cache.get_location().await;
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out_to_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SlowProvider { delay: Duration::from_secs(10), calls: calls.clone() };
        let cache = LocationCache::new(Arc::new(provider));

        let start = Instant::now();
        let location = cache.get_location().await;

        assert!(location.is_fallback);
        assert_eq!(location.coordinates, Coordinates::DEFAULT_CITY);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_query() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SlowProvider { delay: Duration::from_millis(200), calls: calls.clone() };
        let cache = LocationCache::new(Arc::new(provider));

        let (a, b, c) = tokio::join!(cache.get_location(), cache.get_location(), cache.get_location());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.coordinates, HANOI);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_and_invalidate() {
        let mut provider = MockLocationProvider::new();
        provider.expect_current_position().times(2).returning(|_| Ok(HANOI));

        let cache = LocationCache::new(Arc::new(provider));
        assert!(cache.peek().await.is_none());

        cache.get_location().await;
        assert!(cache.peek().await.is_some());

        cache.invalidate().await;
        assert!(cache.peek().await.is_none());

        cache.get_location().await;
        assert!(cache.peek().await.is_some());
    }
}
