//! Cache store — the TTL-capable key-value backend behind the resolver.
//!
//! The resolver depends on the [`Store`] trait only; physical persistence
//! and per-key expiry are entirely the store's concern. Two implementations
//! are provided:
//!
//! - [`RedisStore`] — shared Redis backend for production deployments.
//! - [`MemoryStore`] — in-process backend for tests and development without
//!   a running Redis.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Errors surfaced by a cache store.
///
/// A failing store is never treated as a cache miss: resolutions fail closed
/// and the error reaches the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable {
            message: err.to_string(),
        }
    }
}

/// Contract the caching core requires of its key-value store.
///
/// Values are opaque strings; liveness is delegated to the store's own
/// per-key expiry, so a present key always means a non-expired entry.
/// `push_and_trim` must behave as one atomic operation: no reader may
/// observe the list longer than `max_len`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches the value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` under `key` with a relative expiry of `ttl_seconds`.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), StoreError>;

    /// Deletes `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Pushes `value` to the front of `list` and trims the list to
    /// `max_len` entries in the same atomic operation.
    async fn push_and_trim(
        &self,
        list: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), StoreError>;

    /// Returns the entries of `list`, front (newest) first.
    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError>;
}

/// Redis-backed store using a multiplexed [`ConnectionManager`].
///
/// The manager reconnects automatically; commands issued while the
/// connection is down fail with [`StoreError::Unavailable`].
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the Redis instance at `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the URL is invalid or the
    /// initial connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        debug!(url, "connected to redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn push_and_trim(
        &self,
        list: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // LPUSH + LTRIM inside MULTI/EXEC so no reader ever sees the list
        // above max_len.
        let _: () = redis::pipe()
            .atomic()
            .lpush(list, value)
            .ignore()
            .ltrim(list, 0, max_len as isize - 1)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = conn.lrange(list, 0, -1).await?;
        Ok(items)
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, MemoryEntry>,
    lists: HashMap<String, VecDeque<String>>,
}

/// In-process store with the same expiry semantics as Redis.
///
/// Expired entries are dropped lazily on read, which is indistinguishable
/// from eager expiry through the [`Store`] interface. All operations take a
/// single mutex, so push-and-trim is trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
            None => return Ok(None),
        }
        // Present but past its expiry; drop it lazily.
        inner.entries.remove(key);
        Ok(None)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.entries.insert(
            key.to_owned(),
            MemoryEntry {
                value: value.to_owned(),
                expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.entries.remove(key);
        Ok(())
    }

    async fn push_and_trim(
        &self,
        list: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let entries = inner.lists.entry(list.to_owned()).or_default();
        entries.push_front(value.to_owned());
        entries.truncate(max_len);
        Ok(())
    }

    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .lists
            .get(list)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_what_was_set() {
        let store = MemoryStore::new();
        store.set_with_expiry("/posts", "{}", 60).await.unwrap();
        assert_eq!(store.get("/posts").await.unwrap(), Some("{}".to_owned()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("/nothing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let store = MemoryStore::new();
        store.set_with_expiry("/posts", "{}", 1).await.unwrap();
        assert!(store.get("/posts").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(store.get("/posts").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.set_with_expiry("/posts", "{}", 60).await.unwrap();
        store.delete("/posts").await.unwrap();
        store.delete("/posts").await.unwrap(); // second delete is a no-op
        assert_eq!(store.get("/posts").await.unwrap(), None);
    }

    #[tokio::test]
    async fn push_and_trim_caps_the_list() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store
                .push_and_trim("log", &i.to_string(), 3)
                .await
                .unwrap();
        }
        let items = store.range("log").await.unwrap();
        assert_eq!(items, vec!["9", "8", "7"]);
    }

    #[tokio::test]
    async fn range_of_unknown_list_is_empty() {
        let store = MemoryStore::new();
        assert!(store.range("log").await.unwrap().is_empty());
    }
}
