//! Caching core — hit/miss resolution, invalidation, and the activity log.
//!
//! This is the decision engine the transport layer delegates to:
//!
//! - [`Resolver`] — derives the cache key, resolves HIT/MISS/bypass, reads
//!   and writes the store, and records every resolution.
//! - [`Invalidator`] — explicit, idempotent single-key invalidation.
//! - [`ActivityLog`] — bounded recent-history of resolved requests,
//!   independent of raw transport logs.
//!
//! The core owns no I/O of its own; it drives the injected
//! [`Store`](crate::store::Store) and [`Origin`](crate::origin::Origin)
//! collaborators.

pub mod invalidate;
pub mod log;
pub mod resolver;

pub use invalidate::Invalidator;
pub use log::{ActivityLog, LogEntry, MAX_RECENT_ENTRIES};
pub use resolver::{
    CacheError, DEFAULT_TTL_SECS, Disposition, RequestDescriptor, Resolved, Resolver, coerce_ttl,
};
