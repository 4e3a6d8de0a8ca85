//! # cachet
//!
//! A transparent HTTP caching reverse proxy built on Tokio and Redis.
//!
//! cachet sits between clients and a single upstream origin. GET responses
//! are captured in a TTL-capable store and served directly on repeat
//! requests; every response carries an `X-Cache: HIT|MISS` header so callers
//! can observe the cache disposition.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cachet::origin::HttpOrigin;
//! use cachet::proxy::ProxyApp;
//! use cachet::server::Server;
//! use cachet::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let origin = Arc::new(HttpOrigin::new("http://localhost:3000")?);
//!     let app = Arc::new(ProxyApp::new(store, origin));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| {
//!         let app = Arc::clone(&app);
//!         async move { app.handle(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

// ── Caching core ──────────────────────────────────────────────────────────────
pub mod cache;
pub mod origin;
pub mod store;

// ── Transport ─────────────────────────────────────────────────────────────────
pub mod http;
pub mod middleware;
pub mod proxy;
pub mod security;
pub mod server;

// ── Process configuration ─────────────────────────────────────────────────────
pub mod config;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{ActivityLog, CacheError, Disposition, Invalidator, RequestDescriptor, Resolver};
pub use config::ProxyConfig;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
