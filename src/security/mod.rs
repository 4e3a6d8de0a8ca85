//! Security middleware.
//!
//! The proxy is commonly consumed directly from browser applications, so it
//! ships with CORS support: [`CorsMiddleware`].

pub mod middleware;

pub use middleware::CorsMiddleware;
