//! Explicit cache invalidation.

use std::sync::Arc;

use tracing::debug;

use crate::store::Store;

use super::resolver::CacheError;

/// Deletes single cache entries on explicit request.
///
/// Invalidation is unconditional and idempotent: deleting a key that was
/// never cached (or already expired) succeeds exactly like deleting a live
/// one. There is no prefix or wildcard matching.
pub struct Invalidator {
    store: Arc<dyn Store>,
}

impl Invalidator {
    /// Creates an invalidator over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Removes `key` from the store.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingKey`] — `key` is empty.
    /// - [`CacheError::Store`] — the store rejected the delete.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::MissingKey);
        }
        self.store.delete(key).await?;
        debug!(key, "cache entry invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn invalidate_removes_the_entry() {
        let store = Arc::new(MemoryStore::new());
        store.set_with_expiry("/posts", "{}", 60).await.unwrap();

        Invalidator::new(store.clone())
            .invalidate("/posts")
            .await
            .unwrap();
        assert_eq!(store.get("/posts").await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalidating_an_absent_key_succeeds() {
        let store = Arc::new(MemoryStore::new());
        Invalidator::new(store)
            .invalidate("/never-cached")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let err = Invalidator::new(store).invalidate("").await.unwrap_err();
        assert!(matches!(err, CacheError::MissingKey));
    }
}
