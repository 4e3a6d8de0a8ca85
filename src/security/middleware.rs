//! CORS — Cross-Origin Resource Sharing header injection and preflight
//! short-circuiting.

use std::pin::Pin;

use crate::{
    Method, Request, Response, StatusCode,
    middleware::{Middleware, Next},
};

/// CORS middleware — validates the `Origin` header, answers preflight
/// requests, and injects `Access-Control-*` headers on actual responses.
///
/// The proxy's demo frontend (and any browser client) calls it cross-origin,
/// so the default configuration is permissive: all origins, the two verbs
/// the proxy supports, and common request headers.
///
/// # Behavior
///
/// - No `Origin` header, or an origin outside the allow-list: the request
///   passes through unmodified.
/// - `OPTIONS` preflight: short-circuited with `204 No Content` and the
///   `Access-Control-*` headers; the downstream handler is **not** called.
/// - Any other request: the handler runs normally and the CORS headers are
///   appended to its response. `Vary: Origin` is added when a specific
///   (non-wildcard) origin is echoed back.
///
/// # Examples
///
/// ```rust
/// use cachet::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new()
///     .allow_origin("https://app.example.com")
///     .allow_header("X-Request-ID");
/// ```
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Creates a `CorsMiddleware` with permissive defaults: all origins
    /// (`*`), the methods the proxy answers (`GET`, `DELETE`, `OPTIONS`),
    /// and common request headers.
    pub fn new() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
        }
    }

    /// Adds an allowed origin. Pass `"*"` to permit all origins.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed HTTP method, sent verbatim in
    /// `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header, sent verbatim in
    /// `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }
}

impl Middleware for CorsMiddleware {
    fn handle(
        &self,
        request: Request,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let allowed_origins = self.allowed_origins.clone();
        let allowed_methods = self.allowed_methods.clone();
        let allowed_headers = self.allowed_headers.clone();

        Box::pin(async move {
            let request_origin = request.headers().get("origin").map(str::to_owned);
            let is_preflight = request.method() == &Method::Options;
            let Some(origin) = request_origin else {
                return next.run(request).await;
            };

            let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
                "*".to_owned()
            } else if allowed_origins.contains(&origin) {
                origin.clone()
            } else {
                return next.run(request).await;
            };

            let methods_str = allowed_methods.join(", ");
            let headers_str = allowed_headers.join(", ");
            let is_wildcard = allow_origin == "*";

            if is_preflight {
                let mut resp = Response::new(StatusCode::NoContent)
                    .header("Access-Control-Allow-Origin", &allow_origin)
                    .header("Access-Control-Allow-Methods", &methods_str)
                    .header("Access-Control-Allow-Headers", &headers_str)
                    .header("Access-Control-Max-Age", "3600");
                if !is_wildcard {
                    resp.add_header("Vary", "Origin");
                }
                return resp;
            }

            let mut resp = next.run(request).await;
            resp.add_header("Access-Control-Allow-Origin", &allow_origin);
            resp.add_header("Access-Control-Allow-Methods", &methods_str);
            resp.add_header("Access-Control-Allow-Headers", &headers_str);
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            resp
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Chain, from_fn};

    fn request(method: &str, origin: Option<&str>) -> Request {
        let origin_header = origin
            .map(|o| format!("Origin: {o}\r\n"))
            .unwrap_or_default();
        let raw = format!("{method} /posts HTTP/1.1\r\nHost: test\r\n{origin_header}\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn chain_with(cors: CorsMiddleware) -> Chain {
        Chain::new()
            .layer(cors)
            .mount(from_fn(|_req| async { Response::new(StatusCode::Ok) }))
    }

    #[tokio::test]
    async fn no_origin_header_passes_through() {
        let response = chain_with(CorsMiddleware::new())
            .run(request("GET", None))
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.header_value("Access-Control-Allow-Origin"), None);
    }

    #[tokio::test]
    async fn wildcard_echoes_star() {
        let response = chain_with(CorsMiddleware::new())
            .run(request("GET", Some("https://app.test")))
            .await;
        assert_eq!(
            response.header_value("Access-Control-Allow-Origin"),
            Some("*")
        );
        assert_eq!(response.header_value("Vary"), None);
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let response = chain_with(CorsMiddleware::new())
            .run(request("OPTIONS", Some("https://app.test")))
            .await;
        assert_eq!(response.status(), StatusCode::NoContent);
        assert!(response.header_value("Access-Control-Allow-Methods").is_some());
    }

    #[tokio::test]
    async fn specific_origin_gets_vary_header() {
        let cors = CorsMiddleware {
            allowed_origins: vec!["https://app.test".to_string()],
            ..CorsMiddleware::new()
        };
        let response = chain_with(cors)
            .run(request("GET", Some("https://app.test")))
            .await;
        assert_eq!(
            response.header_value("Access-Control-Allow-Origin"),
            Some("https://app.test")
        );
        assert_eq!(response.header_value("Vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn unlisted_origin_passes_through_unmodified() {
        let cors = CorsMiddleware {
            allowed_origins: vec!["https://app.test".to_string()],
            ..CorsMiddleware::new()
        };
        let response = chain_with(cors)
            .run(request("GET", Some("https://evil.test")))
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.header_value("Access-Control-Allow-Origin"), None);
    }
}
