//! Cache resolution — the HIT/MISS/bypass decision engine.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::origin::{Origin, OriginError};
use crate::store::{Store, StoreError};

use super::log::ActivityLog;

/// TTL applied when a request carries no usable `cache-ttl` option.
pub const DEFAULT_TTL_SECS: u64 = 60;

/// How a request was answered: from the cache or from the origin.
///
/// Surfaced to clients verbatim in the `X-Cache` response header and
/// recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Disposition {
    Hit,
    Miss,
}

impl Disposition {
    /// Returns the header form of the disposition.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the caching core.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A required cache key was empty or absent. Client error, not retried.
    #[error("missing required cache key")]
    MissingKey,

    /// The store failed. Resolutions fail closed rather than silently
    /// skipping persistence.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The origin fetch failed. Nothing was written to the store.
    #[error(transparent)]
    Origin(#[from] OriginError),
}

/// One inbound request as the resolver sees it.
///
/// The key is the verbatim `path?query` string — opaque, case-sensitive,
/// and parameter-order-sensitive. No normalization is applied.
///
/// # Examples
///
/// ```
/// use cachet::cache::RequestDescriptor;
///
/// let descriptor = RequestDescriptor::new("/posts?page=2")
///     .bypass(false)
///     .ttl_seconds(120);
/// assert_eq!(descriptor.key, "/posts?page=2");
/// ```
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Exact request path plus query string, used verbatim as the cache key.
    pub key: String,
    /// When `true`, the store is neither read nor written for this request.
    pub bypass: bool,
    /// Expiry for a value written on this resolution, in seconds.
    pub ttl_seconds: u64,
}

impl RequestDescriptor {
    /// Creates a descriptor with bypass off and the default TTL.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            bypass: false,
            ttl_seconds: DEFAULT_TTL_SECS,
        }
    }

    /// Sets the cache-bypass flag (`no-cache=true` in the query string).
    #[must_use]
    pub fn bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    /// Sets the TTL for a value written on this resolution.
    #[must_use]
    pub fn ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }
}

/// Coerces a raw `cache-ttl` query value to a positive TTL in seconds.
///
/// Absent, non-numeric, zero, and negative values all fall back to
/// [`DEFAULT_TTL_SECS`].
///
/// # Examples
///
/// ```
/// use cachet::cache::{DEFAULT_TTL_SECS, coerce_ttl};
///
/// assert_eq!(coerce_ttl(Some("120")), 120);
/// assert_eq!(coerce_ttl(Some("abc")), DEFAULT_TTL_SECS);
/// assert_eq!(coerce_ttl(None), DEFAULT_TTL_SECS);
/// ```
pub fn coerce_ttl(raw: Option<&str>) -> u64 {
    match raw.and_then(|v| v.parse::<i64>().ok()) {
        Some(ttl) if ttl > 0 => ttl as u64,
        _ => DEFAULT_TTL_SECS,
    }
}

/// A resolved request: the response body and how it was obtained.
#[derive(Debug)]
pub struct Resolved {
    pub body: Value,
    pub disposition: Disposition,
}

/// The caching decision engine.
///
/// Owns the resolution algorithm and is the sole writer of cache entries
/// and activity-log records. Store and origin are injected so tests can
/// substitute in-memory fakes.
pub struct Resolver {
    store: Arc<dyn Store>,
    origin: Arc<dyn Origin>,
    log: ActivityLog,
}

impl Resolver {
    /// Creates a resolver over the given store and origin.
    pub fn new(store: Arc<dyn Store>, origin: Arc<dyn Origin>) -> Self {
        let log = ActivityLog::new(Arc::clone(&store));
        Self { store, origin, log }
    }

    /// Returns the activity log fed by this resolver.
    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    /// Resolves one request: serve from cache, or forward and capture.
    ///
    /// - With `bypass` set, the store is skipped entirely — no read, and no
    ///   write afterward, so a bypassed request never overwrites an
    ///   existing cached value. The disposition is `MISS`.
    /// - Otherwise a present key is a `HIT`: the stored value is returned
    ///   without contacting the origin. A stored value that no longer
    ///   deserializes is treated as a miss and replaced by the fresh write.
    /// - On a miss the origin is fetched once; the result is written with
    ///   the descriptor's TTL and returned as `MISS`.
    ///
    /// Every successful resolution appends one activity-log record.
    ///
    /// Concurrent resolutions that miss on the same key each fetch the
    /// origin independently and race on the write; the last writer wins.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingKey`] — the descriptor's key is empty.
    /// - [`CacheError::Origin`] — the origin fetch failed; nothing was
    ///   written to the store and no activity record was made.
    /// - [`CacheError::Store`] — the store failed; the resolution fails
    ///   closed instead of skipping persistence.
    pub async fn resolve(&self, descriptor: &RequestDescriptor) -> Result<Resolved, CacheError> {
        if descriptor.key.is_empty() {
            return Err(CacheError::MissingKey);
        }

        if !descriptor.bypass {
            if let Some(raw) = self.store.get(&descriptor.key).await? {
                match serde_json::from_str(&raw) {
                    Ok(body) => {
                        debug!(key = %descriptor.key, "cache hit");
                        self.log.record(&descriptor.key, Disposition::Hit).await?;
                        return Ok(Resolved {
                            body,
                            disposition: Disposition::Hit,
                        });
                    }
                    Err(err) => {
                        // Corrupt entry: fall through to the origin; the
                        // write below replaces it.
                        warn!(key = %descriptor.key, error = %err, "corrupt cache entry, refetching");
                    }
                }
            }
        }

        let body = self.origin.fetch(&descriptor.key).await?;

        if !descriptor.bypass {
            self.store
                .set_with_expiry(&descriptor.key, &body.to_string(), descriptor.ttl_seconds)
                .await?;
            debug!(key = %descriptor.key, ttl = descriptor.ttl_seconds, "cached origin response");
        }

        self.log.record(&descriptor.key, Disposition::Miss).await?;
        Ok(Resolved {
            body,
            disposition: Disposition::Miss,
        })
    }
}
