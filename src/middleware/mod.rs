//! Middleware pipeline — composable before/after handler logic.
//!
//! The proxy's request path is assembled as an ordered [`Chain`]: each
//! middleware wraps the next layer and may pass through, short-circuit with
//! its own response, or decorate the downstream response. The final element
//! is a terminal handler (the proxy application) wrapped via [`from_fn`].
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to
//!   advance one layer.
//! - [`Chain`] — ordered stack, built once at startup and shared across
//!   connection tasks.
//! - [`RequestLogger`] — built-in per-request log line.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::{Request, Response, StatusCode};

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the chain is stored in this form so [`Next`] can advance
/// through the stack without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// The trait all middleware implements.
///
/// Implementations receive the [`Request`] and a [`Next`] cursor and must
/// be `Send + Sync` because the chain is shared across connection tasks.
/// They may:
///
/// - **Pass through** — `next.run(request).await` unchanged.
/// - **Short-circuit** — return a [`Response`] without calling `next`
///   (e.g. a CORS preflight answer).
/// - **Decorate** — run `next`, then modify the returned response.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next layer.
    fn handle(
        &self,
        request: Request,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Converts a [`Middleware`] into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |request: Request, next: Next| middleware.handle(request, next))
}

/// Wraps a plain async handler function as a terminal chain element.
///
/// The resulting handler ignores its `Next` cursor — it is the end of the
/// line. Used to mount the proxy application at the bottom of the stack.
pub fn from_fn<F, Fut>(handler: F) -> MiddlewareHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |request: Request, _next: Next| {
        let handler = Arc::clone(&handler);
        Box::pin(async move { handler(request).await })
    })
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can advance
/// the chain at most once. When the chain is exhausted without any layer
/// producing a response, a `500` fallback is returned.
pub struct Next {
    handlers: Vec<MiddlewareHandler>,
    index: usize,
}

impl Next {
    /// Creates a cursor positioned at the start of the given stack.
    pub fn new(handlers: Vec<MiddlewareHandler>) -> Self {
        Self { handlers, index: 0 }
    }

    /// Invokes the next layer in the chain and returns its response.
    pub async fn run(mut self, request: Request) -> Response {
        if self.index < self.handlers.len() {
            let handler = self.handlers[self.index].clone();
            self.index += 1;
            handler(request, self).await
        } else {
            Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// An ordered middleware stack, built once and shared across requests.
///
/// # Examples
///
/// ```rust,no_run
/// use cachet::middleware::{Chain, RequestLogger, from_fn};
/// use cachet::{Response, StatusCode};
///
/// let chain = Chain::new()
///     .layer(RequestLogger)
///     .mount(from_fn(|_req| async { Response::new(StatusCode::Ok) }));
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<MiddlewareHandler>,
}

impl Chain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware layer.
    #[must_use]
    pub fn layer<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.handlers.push(from_middleware(Arc::new(middleware)));
        self
    }

    /// Appends a pre-built handler (typically the terminal one).
    #[must_use]
    pub fn mount(mut self, handler: MiddlewareHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Runs a request through the chain.
    pub async fn run(&self, request: Request) -> Response {
        Next::new(self.handlers.clone()).run(request).await
    }
}

/// Built-in middleware that logs each request's method, path, status, and
/// duration as one `tracing::info!` line once the downstream handler
/// completes. Never short-circuits.
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn handle(
        &self,
        request: Request,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = request.method().as_str().to_owned();
            let url = request.target().to_owned();

            let response = next.run(request).await;

            tracing::info!(
                "{} {} - {} ({:?})",
                method,
                url,
                response.status().as_u16(),
                start.elapsed()
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: test\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[tokio::test]
    async fn exhausted_chain_falls_back_to_500() {
        let chain = Chain::new();
        let response = chain.run(get("/")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn terminal_handler_answers() {
        let chain = Chain::new().mount(from_fn(|_req| async {
            Response::new(StatusCode::Ok).body("done")
        }));
        let response = chain.run(get("/")).await;
        assert_eq!(response.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn layers_run_in_registration_order() {
        struct Tagger(&'static str);

        impl Middleware for Tagger {
            fn handle(
                &self,
                request: Request,
                next: Next,
            ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
                let tag = self.0;
                Box::pin(async move {
                    let mut response = next.run(request).await;
                    response.add_header("X-Tag", tag);
                    response
                })
            }
        }

        let chain = Chain::new()
            .layer(Tagger("outer"))
            .layer(Tagger("inner"))
            .mount(from_fn(|_req| async { Response::new(StatusCode::Ok) }));

        let response = chain.run(get("/")).await;
        // Inner decorates first on the way out.
        assert_eq!(response.header_value("X-Tag"), Some("inner"));
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let chain = Chain::new().layer(RequestLogger).mount(from_fn(|_req| async {
            Response::new(StatusCode::Ok).body("ok")
        }));
        let response = chain.run(get("/posts?cache-ttl=5")).await;
        assert_eq!(response.status(), StatusCode::Ok);
    }
}
