//! Activity log — bounded recent-history of resolved requests.
//!
//! Every resolution appends one record (url, disposition, timestamp) to a
//! store-backed list that is trimmed to [`MAX_RECENT_ENTRIES`] in the same
//! atomic operation, so a reader never observes the list over its cap. This
//! history is independent of the transport-level `tracing` output; it is
//! what the log read endpoint serves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::store::{Store, StoreError};

use super::resolver::Disposition;

/// Upper bound on retained activity records.
pub const MAX_RECENT_ENTRIES: usize = 50;

/// Store list the activity records live under.
const ACTIVITY_LIST: &str = "cachet:activity";

/// One resolved request: which url, how it was answered, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub url: String,
    pub disposition: Disposition,
    /// RFC 3339 resolution timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Bounded activity log over a shared store list.
pub struct ActivityLog {
    store: Arc<dyn Store>,
}

impl ActivityLog {
    /// Creates an activity log backed by the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Appends a record for a resolved request and trims the history to
    /// [`MAX_RECENT_ENTRIES`] in one atomic store operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store rejects the write.
    pub async fn record(&self, url: &str, disposition: Disposition) -> Result<(), StoreError> {
        let entry = json!({
            "url": url,
            "disposition": disposition.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.store
            .push_and_trim(ACTIVITY_LIST, &entry.to_string(), MAX_RECENT_ENTRIES)
            .await
    }

    /// Returns the recorded history, newest first, at most
    /// [`MAX_RECENT_ENTRIES`] entries. Read-only.
    ///
    /// Records that no longer deserialize are skipped with a warning rather
    /// than failing the whole read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    pub async fn recent(&self) -> Result<Vec<LogEntry>, StoreError> {
        let raw = self.store.range(ACTIVITY_LIST).await?;
        Ok(raw
            .iter()
            .filter_map(|item| match serde_json::from_str(item) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable activity record");
                    None
                }
            })
            .collect())
    }
}
