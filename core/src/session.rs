//! Session cache and router-minted session identity.
//!
//! A logical client session is keyed either by an MCP-supplied session
//! header or by a JWT the router mints on `initialize`. Each entry maps the
//! owning backend's upstream id to the session id that backend issued, so a
//! follow-up request can be steered to the backend with the right
//! `mcp-session-id` attached. Entries are bounded by an LRU and expire after
//! an idle TTL; session state is best-effort by contract.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::UpstreamId;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SESSION_CAPACITY: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session key expired")]
    Expired,
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Keyed store mapping a session key to per-backend session ids. The router
/// depends on this interface; the in-process store below is one
/// implementation, a remote store is another.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Records `upstream -> session` under `key`. Returns whether the key
    /// was newly created.
    async fn add_session(
        &self,
        key: &str,
        upstream: &UpstreamId,
        session: &str,
    ) -> Result<bool, SessionError>;

    async fn get_session(&self, key: &str)
    -> Result<Option<HashMap<UpstreamId, String>>, SessionError>;

    async fn delete_sessions(&self, keys: &[String]) -> Result<(), SessionError>;

    async fn remove_server_session(
        &self,
        key: &str,
        upstream: &UpstreamId,
    ) -> Result<(), SessionError>;

    async fn key_exists(&self, key: &str) -> Result<bool, SessionError>;
}

struct SessionEntry {
    backends: HashMap<UpstreamId, String>,
    last_seen: Instant,
}

/// Bounded in-process store. Idle entries are evicted lazily: every
/// operation drains expired entries from the cold end of the LRU before
/// touching the map, so the cache never retains an idle session past its TTL
/// plus one operation.
pub struct MemorySessionStore {
    entries: Mutex<lru::LruCache<String, SessionEntry>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL)
    }
}

impl MemorySessionStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
            ttl,
        }
    }

    fn evict_idle(&self, entries: &mut lru::LruCache<String, SessionEntry>) {
        let now = Instant::now();
        while let Some((_, entry)) = entries.peek_lru() {
            if now.duration_since(entry.last_seen) < self.ttl {
                break;
            }
            entries.pop_lru();
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn add_session(
        &self,
        key: &str,
        upstream: &UpstreamId,
        session: &str,
    ) -> Result<bool, SessionError> {
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries);
        if let Some(entry) = entries.get_mut(key) {
            entry.backends.insert(upstream.clone(), session.to_string());
            entry.last_seen = Instant::now();
            return Ok(false);
        }
        let mut backends = HashMap::new();
        backends.insert(upstream.clone(), session.to_string());
        entries.put(
            key.to_string(),
            SessionEntry {
                backends,
                last_seen: Instant::now(),
            },
        );
        Ok(true)
    }

    async fn get_session(
        &self,
        key: &str,
    ) -> Result<Option<HashMap<UpstreamId, String>>, SessionError> {
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries);
        Ok(entries.get_mut(key).map(|entry| {
            entry.last_seen = Instant::now();
            entry.backends.clone()
        }))
    }

    async fn delete_sessions(&self, keys: &[String]) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.pop(key);
        }
        Ok(())
    }

    async fn remove_server_session(
        &self,
        key: &str,
        upstream: &UpstreamId,
    ) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.backends.remove(upstream);
        }
        Ok(())
    }

    async fn key_exists(&self, key: &str) -> Result<bool, SessionError> {
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries);
        Ok(entries.contains(key))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Random session id; the stable part of the key.
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and verifies the router's own session keys: HS256 JWTs carrying a
/// random `sid`. Backends never see these; they are the client-facing handle
/// the cache is keyed by.
pub struct SessionKeyMinter {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionKeyMinter {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::default(),
            ttl,
        }
    }

    pub fn mint(&self) -> Result<String, SessionError> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sid: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Jwt(err),
            })
    }

    /// Whether `candidate` is a key this router minted, as opposed to an
    /// MCP-supplied opaque session id.
    pub fn is_minted_key(&self, candidate: &str) -> bool {
        self.verify(candidate).is_ok()
    }
}
