//! Revoked-token store.
//!
//! Logout writes `jwt:revoked:<token-id> -> "1"` with a TTL equal to the
//! remaining lifetime of the revoked token, so entries expire on their own
//! and never need explicit garbage collection. The store is behind a trait
//! so tests run against a process-local map instead of Redis.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

use crate::error::RevocationError;

/// Key prefix for revocation entries.
const KEY_PREFIX: &str = "jwt:revoked:";

/// Short-TTL key/value store of revoked token identifiers.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark a token identifier revoked for `ttl`.
    async fn revoke(&self, token_id: &str, ttl: Duration) -> Result<(), RevocationError>;

    /// Whether a token identifier is currently revoked.
    async fn is_revoked(&self, token_id: &str) -> Result<bool, RevocationError>;

    /// Round-trip health probe.
    async fn ping(&self) -> Result<(), RevocationError>;
}

/// Redis-backed revocation store.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RevocationError::Unavailable`] if the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, RevocationError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RevocationStore for RedisStore {
    async fn revoke(&self, token_id: &str, ttl: Duration) -> Result<(), RevocationError> {
        let mut conn = self.conn.clone();
        let key = format!("{KEY_PREFIX}{token_id}");
        // SET .. EX rejects a zero expiry; clamp to one second.
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = redis::AsyncCommands::set_ex(&mut conn, key, "1", ttl_secs).await?;
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, RevocationError> {
        let mut conn = self.conn.clone();
        let key = format!("{KEY_PREFIX}{token_id}");
        let value: Option<String> = redis::AsyncCommands::get(&mut conn, key).await?;
        Ok(value.is_some())
    }

    async fn ping(&self) -> Result<(), RevocationError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Process-local revocation store for tests.
///
/// Entries expire lazily on lookup, matching the auto-expiry contract of the
/// Redis store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Instant>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for MemoryStore {
    async fn revoke(&self, token_id: &str, ttl: Duration) -> Result<(), RevocationError> {
        let expires = Instant::now() + ttl;
        self.entries.write().await.insert(token_id.to_owned(), expires);
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, RevocationError> {
        let entries = self.entries.read().await;
        Ok(entries.get(token_id).is_some_and(|expires| *expires > Instant::now()))
    }

    async fn ping(&self) -> Result<(), RevocationError> {
        Ok(())
    }
}
