//! The proxy application — maps inbound HTTP requests onto the caching core.
//!
//! Three routes:
//!
//! | Route                  | Effect                                            |
//! |------------------------|---------------------------------------------------|
//! | `DELETE /__cache?key=K`| Invalidate the cache entry for `K`                |
//! | `GET /__cache/log`     | Recent resolutions as a JSON array, newest first  |
//! | `GET <anything else>`  | Resolve through the cache and forward on a miss   |
//!
//! Every proxied response carries an `X-Cache: HIT|MISS` header. Non-GET
//! verbs (other than the admin delete) are answered with `405` and never
//! reach the resolver.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, warn};

use crate::cache::{CacheError, Invalidator, RequestDescriptor, Resolver, coerce_ttl};
use crate::http::{Method, Request, Response, StatusCode};
use crate::origin::Origin;
use crate::store::Store;

/// Path of the cache-administration endpoint.
const ADMIN_PATH: &str = "/__cache";

/// Path of the activity-log read endpoint.
const LOG_PATH: &str = "/__cache/log";

/// Query option that bypasses the cache when set to `true`.
const NO_CACHE_PARAM: &str = "no-cache";

/// Query option carrying a per-request TTL override in seconds.
const TTL_PARAM: &str = "cache-ttl";

/// The assembled proxy: resolver plus invalidator over one shared store.
///
/// One `ProxyApp` is built at startup and shared (via `Arc`) across all
/// connection tasks; [`handle`](Self::handle) is the terminal element of
/// the middleware chain.
pub struct ProxyApp {
    resolver: Resolver,
    invalidator: Invalidator,
}

impl ProxyApp {
    /// Wires the caching core over the given store and origin.
    pub fn new(store: Arc<dyn Store>, origin: Arc<dyn Origin>) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&store), origin),
            invalidator: Invalidator::new(store),
        }
    }

    /// Dispatches one request to the matching route.
    pub async fn handle(&self, request: Request) -> Response {
        match (request.method(), request.path()) {
            (Method::Delete, ADMIN_PATH) => self.invalidate(&request).await,
            (Method::Get, LOG_PATH) => self.activity().await,
            (Method::Get, _) => self.proxy(&request).await,
            _ => Response::new(StatusCode::MethodNotAllowed)
                .json(json!({"error": "Only GET requests are proxied"}).to_string()),
        }
    }

    /// `GET path?query` — resolve through the cache.
    async fn proxy(&self, request: &Request) -> Response {
        let descriptor = RequestDescriptor::new(request.target())
            .bypass(request.query_param(NO_CACHE_PARAM) == Some("true"))
            .ttl_seconds(coerce_ttl(request.query_param(TTL_PARAM)));

        match self.resolver.resolve(&descriptor).await {
            Ok(resolved) => Response::new(StatusCode::Ok)
                .header("X-Cache", resolved.disposition.as_str())
                .json(resolved.body.to_string()),
            Err(CacheError::Origin(err)) => {
                warn!(key = %descriptor.key, error = %err, "origin fetch failed");
                Response::new(StatusCode::BadGateway)
                    .json(json!({"error": "Origin request failed"}).to_string())
            }
            Err(CacheError::MissingKey) => Response::new(StatusCode::BadRequest)
                .json(json!({"error": "Missing cache key"}).to_string()),
            Err(err) => {
                error!(key = %descriptor.key, error = %err, "resolution failed");
                Response::new(StatusCode::InternalServerError)
                    .json(json!({"error": "Proxy server error"}).to_string())
            }
        }
    }

    /// `DELETE /__cache?key=K` — explicit invalidation.
    async fn invalidate(&self, request: &Request) -> Response {
        let Some(key) = request.query_param("key").filter(|k| !k.is_empty()) else {
            return Response::new(StatusCode::BadRequest)
                .json(json!({"error": "Missing \"key\" query parameter"}).to_string());
        };

        match self.invalidator.invalidate(key).await {
            Ok(()) => Response::new(StatusCode::Ok)
                .json(json!({"status": "Cache cleared", "key": key}).to_string()),
            Err(CacheError::MissingKey) => Response::new(StatusCode::BadRequest)
                .json(json!({"error": "Missing \"key\" query parameter"}).to_string()),
            Err(err) => {
                error!(key, error = %err, "invalidation failed");
                Response::new(StatusCode::InternalServerError)
                    .json(json!({"error": "Proxy server error"}).to_string())
            }
        }
    }

    /// `GET /__cache/log` — recent resolutions, newest first.
    async fn activity(&self) -> Response {
        match self.resolver.activity_log().recent().await {
            Ok(entries) => match serde_json::to_string(&entries) {
                Ok(body) => Response::new(StatusCode::Ok).json(body),
                Err(err) => {
                    error!(error = %err, "failed to serialize activity log");
                    Response::new(StatusCode::InternalServerError)
                        .json(json!({"error": "Proxy server error"}).to_string())
                }
            },
            Err(err) => {
                error!(error = %err, "failed to read activity log");
                Response::new(StatusCode::InternalServerError)
                    .json(json!({"error": "Proxy server error"}).to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::{Disposition, LogEntry};
    use crate::origin::OriginError;
    use crate::store::MemoryStore;

    struct CountingOrigin {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Origin for CountingOrigin {
        async fn fetch(&self, _path_and_query: &str) -> Result<Value, OriginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"id": 1}))
        }
    }

    struct DownOrigin;

    #[async_trait]
    impl Origin for DownOrigin {
        async fn fetch(&self, path_and_query: &str) -> Result<Value, OriginError> {
            Err(OriginError::Status {
                status: 503,
                path: path_and_query.to_owned(),
            })
        }
    }

    fn app() -> (ProxyApp, Arc<CountingOrigin>) {
        let origin = Arc::new(CountingOrigin {
            calls: AtomicUsize::new(0),
        });
        let app = ProxyApp::new(Arc::new(MemoryStore::new()), origin.clone());
        (app, origin)
    }

    fn request(method: &str, target: &str) -> Request {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: test\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[tokio::test]
    async fn get_misses_then_hits_with_header() {
        let (app, origin) = app();

        let first = app.handle(request("GET", "/posts")).await;
        assert_eq!(first.status(), StatusCode::Ok);
        assert_eq!(first.header_value("X-Cache"), Some("MISS"));

        let second = app.handle(request("GET", "/posts")).await;
        assert_eq!(second.header_value("X-Cache"), Some("HIT"));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_cache_param_bypasses_store() {
        let (app, origin) = app();

        app.handle(request("GET", "/posts?no-cache=true")).await;
        let second = app.handle(request("GET", "/posts?no-cache=true")).await;
        assert_eq!(second.header_value("X-Cache"), Some("MISS"));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_query_strings_are_distinct_keys() {
        let (app, origin) = app();

        app.handle(request("GET", "/posts?page=1")).await;
        let other = app.handle(request("GET", "/posts?page=2")).await;
        assert_eq!(other.header_value("X-Cache"), Some("MISS"));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn delete_clears_the_entry() {
        let (app, origin) = app();

        app.handle(request("GET", "/posts")).await;
        let cleared = app.handle(request("DELETE", "/__cache?key=/posts")).await;
        assert_eq!(cleared.status(), StatusCode::Ok);

        let after = app.handle(request("GET", "/posts")).await;
        assert_eq!(after.header_value("X-Cache"), Some("MISS"));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn delete_without_key_is_bad_request() {
        let (app, _) = app();
        let response = app.handle(request("DELETE", "/__cache")).await;
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn delete_of_uncached_key_succeeds() {
        let (app, _) = app();
        let response = app
            .handle(request("DELETE", "/__cache?key=/never-seen"))
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn write_verbs_never_reach_the_resolver() {
        let (app, origin) = app();
        let response = app.handle(request("POST", "/posts")).await;
        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
        assert_eq!(origin.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn origin_failure_maps_to_bad_gateway() {
        let app = ProxyApp::new(Arc::new(MemoryStore::new()), Arc::new(DownOrigin));
        let response = app.handle(request("GET", "/posts")).await;
        assert_eq!(response.status(), StatusCode::BadGateway);
    }

    #[tokio::test]
    async fn log_endpoint_lists_resolutions_newest_first() {
        let (app, _) = app();
        app.handle(request("GET", "/posts")).await;
        app.handle(request("GET", "/posts")).await;

        let response = app.handle(request("GET", "/__cache/log")).await;
        assert_eq!(response.status(), StatusCode::Ok);

        let wire = String::from_utf8(response.into_bytes().to_vec()).unwrap();
        let body = wire.split("\r\n\r\n").nth(1).unwrap();
        let entries: Vec<LogEntry> = serde_json::from_str(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].disposition, Disposition::Hit);
        assert_eq!(entries[1].disposition, Disposition::Miss);
    }

    #[tokio::test]
    async fn malformed_ttl_falls_back_to_default() {
        let (app, _) = app();
        let response = app.handle(request("GET", "/posts?cache-ttl=abc")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.header_value("X-Cache"), Some("MISS"));
    }

    // keep LogEntry deserialization honest against what record() writes
    #[tokio::test]
    async fn log_entries_deserialize_from_endpoint_shape() {
        let (app, _) = app();
        app.handle(request("GET", "/posts")).await;

        let entries = app.resolver.activity_log().recent().await.unwrap();
        let round_trip: Vec<LogEntry> =
            serde_json::from_str(&serde_json::to_string(&entries).unwrap()).unwrap();
        assert_eq!(round_trip[0].url, "/posts");
    }
}
