//! Persisted session credentials
//!
//! The [`SessionStore`] keeps the access token, refresh token, and user
//! profile in the durable key-value store and mirrors them in memory so the
//! request pipeline does not hit storage on every call.
//!
//! Every write goes to the in-memory copy first. A clear therefore takes
//! effect for all later reads in this process, even if erasing the durable
//! copy fails.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use storage::{KvError, KvStore};
use thiserror::Error;

const ACCESS_TOKEN_KEY: &str = "session:access_token";
const REFRESH_TOKEN_KEY: &str = "session:refresh_token";
const USER_KEY: &str = "session:user";

/// Session-related errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Durable storage failed
    #[error("Session storage error: {0}")]
    Storage(#[from] KvError),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Identity of the signed-in user as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Backend user id
    pub id: String,

    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Any other fields the backend sends, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Create a profile with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), email: None, full_name: None, extra: serde_json::Map::new() }
    }
}

/// Credentials and identity produced by a successful login or registration
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Bearer token attached to requests
    pub access_token: String,
    /// Token used to obtain a new access token
    pub refresh_token: Option<String>,
    /// Signed-in user
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone)]
enum Cached<T> {
    Unloaded,
    Loaded(Option<T>),
}

#[derive(Debug)]
struct SessionCache {
    access_token: Cached<String>,
    refresh_token: Cached<String>,
    user: Cached<UserProfile>,
    /// Bumped on every write so a slow storage read cannot repopulate a
    /// value that was replaced or cleared while it was in flight.
    generation: u64,
}

impl SessionCache {
    fn unloaded() -> Self {
        Self {
            access_token: Cached::Unloaded,
            refresh_token: Cached::Unloaded,
            user: Cached::Unloaded,
            generation: 0,
        }
    }
}

/// Durable session store with an in-memory read cache
pub struct SessionStore {
    kv: KvStore,
    cache: RwLock<SessionCache>,
}

impl SessionStore {
    /// Create a store backed by the given key-value store
    pub fn new(kv: KvStore) -> Self {
        Self { kv, cache: RwLock::new(SessionCache::unloaded()) }
    }

    /// Current access token, if signed in
    pub async fn get_token(&self) -> Result<Option<String>> {
        self.read_cached(ACCESS_TOKEN_KEY, |c| &mut c.access_token)
    }

    /// Replace the access token
    pub async fn save_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        {
            let mut cache = self.cache.write();
            cache.access_token = Cached::Loaded(Some(token.clone()));
            cache.generation += 1;
        }
        self.kv.set(ACCESS_TOKEN_KEY, &token)?;
        self.kv.flush().await?;
        Ok(())
    }

    /// Erase the whole session: access token, refresh token, and user
    ///
    /// The three durable entries are removed in one atomic batch.
    pub async fn remove_token(&self) -> Result<()> {
        self.clear().await
    }

    /// Erase the whole session (see [`SessionStore::remove_token`])
    pub async fn clear(&self) -> Result<()> {
        {
            let mut cache = self.cache.write();
            cache.access_token = Cached::Loaded(None);
            cache.refresh_token = Cached::Loaded(None);
            cache.user = Cached::Loaded(None);
            cache.generation += 1;
        }
        self.kv.remove_all(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY])?;
        self.kv.flush().await?;
        tracing::info!("session cleared");
        Ok(())
    }

    /// Current refresh token
    pub async fn get_refresh_token(&self) -> Result<Option<String>> {
        self.read_cached(REFRESH_TOKEN_KEY, |c| &mut c.refresh_token)
    }

    /// Replace the refresh token
    pub async fn save_refresh_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        {
            let mut cache = self.cache.write();
            cache.refresh_token = Cached::Loaded(Some(token.clone()));
            cache.generation += 1;
        }
        self.kv.set(REFRESH_TOKEN_KEY, &token)?;
        self.kv.flush().await?;
        Ok(())
    }

    /// Signed-in user profile
    pub async fn get_user(&self) -> Result<Option<UserProfile>> {
        self.read_cached(USER_KEY, |c| &mut c.user)
    }

    /// Replace the user profile
    pub async fn save_user(&self, user: &UserProfile) -> Result<()> {
        {
            let mut cache = self.cache.write();
            cache.user = Cached::Loaded(Some(user.clone()));
            cache.generation += 1;
        }
        self.kv.set(USER_KEY, user)?;
        self.kv.flush().await?;
        Ok(())
    }

    /// Persist a full session after login or registration
    ///
    /// A missing refresh token or user removes any previous value.
    pub async fn save_session(&self, session: &Session) -> Result<()> {
        {
            let mut cache = self.cache.write();
            cache.access_token = Cached::Loaded(Some(session.access_token.clone()));
            cache.refresh_token = Cached::Loaded(session.refresh_token.clone());
            cache.user = Cached::Loaded(session.user.clone());
            cache.generation += 1;
        }

        self.kv.set(ACCESS_TOKEN_KEY, &session.access_token)?;
        match &session.refresh_token {
            Some(token) => self.kv.set(REFRESH_TOKEN_KEY, token)?,
            None => {
                self.kv.remove(REFRESH_TOKEN_KEY)?;
            }
        }
        match &session.user {
            Some(user) => self.kv.set(USER_KEY, user)?,
            None => {
                self.kv.remove(USER_KEY)?;
            }
        }
        self.kv.flush().await?;

        tracing::info!(user_id = ?session.user.as_ref().map(|u| &u.id), "session saved");
        Ok(())
    }

    /// Load the persisted session, if there is an access token
    pub async fn load_session(&self) -> Result<Option<Session>> {
        let Some(access_token) = self.get_token().await? else {
            return Ok(None);
        };

        Ok(Some(Session {
            access_token,
            refresh_token: self.get_refresh_token().await?,
            user: self.get_user().await?,
        }))
    }

    /// Whether an access token is present
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.get_token().await?.is_some())
    }

    fn read_cached<T>(
        &self,
        key: &str,
        slot: impl Fn(&mut SessionCache) -> &mut Cached<T>,
    ) -> Result<Option<T>>
    where
        T: Clone + serde::de::DeserializeOwned,
    {
        let generation = {
            let mut cache = self.cache.write();
            if let Cached::Loaded(value) = slot(&mut cache) {
                return Ok(value.clone());
            }
            cache.generation
        };

        let value: Option<T> = self.kv.get(key)?;

        let mut cache = self.cache.write();
        if cache.generation == generation {
            *slot(&mut cache) = Cached::Loaded(value.clone());
            Ok(value)
        } else if let Cached::Loaded(current) = slot(&mut cache) {
            Ok(current.clone())
        } else {
            Ok(value)
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("kv", &self.kv).finish()
    }
}
