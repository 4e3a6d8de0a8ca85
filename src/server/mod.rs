//! Async TCP front end using Tokio.
//!
//! Accepts connections, parses HTTP/1.1 requests, and dispatches each one to
//! an async handler function — for the proxy binary that handler is the
//! middleware [`Chain`](crate::middleware::Chain) ending in the proxy
//! application. Persistent connections (keep-alive) are supported out of
//! the box.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest complete request the server will buffer before answering 413 (8 MiB).
const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Initial per-connection read buffer capacity.
const READ_BUF_CAPACITY: usize = 4096;

/// The proxy's HTTP listener.
///
/// Binds a TCP address and dispatches incoming HTTP/1.1 requests to a
/// handler function shared across connection tasks.
///
/// # Examples
///
/// ```rust,no_run
/// use cachet::server::Server;
/// use cachet::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req| async {
///         Response::new(StatusCode::Ok).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections and dispatches requests to `handler` until the
    /// process terminates or the listener fails unrecoverably.
    ///
    /// The handler is wrapped in an [`Arc`] and shared across all spawned
    /// Tokio tasks, so it must be `Send + Sync + 'static`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "cachet listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Outcome of trying to cut one complete request out of the read buffer.
enum Framing {
    /// A complete request and the total bytes it occupied in the buffer.
    Complete(Box<Request>, usize),
    /// More data is needed.
    Pending,
    /// The request is malformed; answer with this response and close.
    Reject(Response),
}

/// Attempts to parse one complete request (headers plus declared body) from
/// the front of `buf`.
fn frame_request(buf: &[u8]) -> Framing {
    let (request, body_offset) = match Request::parse(buf) {
        Ok(pair) => pair,
        Err(RequestError::Incomplete) => return Framing::Pending,
        Err(e) => {
            return Framing::Reject(
                Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false),
            );
        }
    };

    // Wait for the full body if Content-Length says more is coming.
    let total_needed = body_offset + request.content_length().unwrap_or(0);
    if buf.len() < total_needed {
        return Framing::Pending;
    }

    Framing::Complete(Box::new(request), total_needed)
}

/// Serves a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: one request is handled
/// per loop iteration until the peer closes or signals `Connection: close`.
async fn serve_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(READ_BUF_CAPACITY);

    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            return Ok(());
        }

        if buf.len() > MAX_REQUEST_BYTES {
            warn!(peer = %peer_addr, "request too large — sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            return Ok(());
        }

        let (request, consumed) = match frame_request(&buf) {
            Framing::Complete(request, consumed) => (request, consumed),
            Framing::Pending => continue,
            Framing::Reject(response) => {
                warn!(peer = %peer_addr, "bad request — sending 400");
                stream.write_all(&response.into_bytes()).await?;
                return Ok(());
            }
        };

        let keep_alive = request.is_keep_alive();
        debug!(
            peer = %peer_addr,
            method = %request.method(),
            url = %request.target(),
            "dispatching request"
        );

        let response = handler(*request).await;
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        // Drop the consumed request bytes; anything left is a pipelined next request.
        let _ = buf.split_to(consumed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_complete_request() {
        let raw = b"GET /posts HTTP/1.1\r\nHost: x\r\n\r\n";
        match frame_request(raw) {
            Framing::Complete(request, consumed) => {
                assert_eq!(request.target(), "/posts");
                assert_eq!(consumed, raw.len());
            }
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn frame_waits_for_headers() {
        assert!(matches!(
            frame_request(b"GET /posts HTTP/1.1\r\nHo"),
            Framing::Pending
        ));
    }

    #[test]
    fn frame_waits_for_declared_body() {
        let raw = b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 10\r\n\r\nhel";
        assert!(matches!(frame_request(raw), Framing::Pending));
    }

    #[test]
    fn frame_rejects_garbage() {
        assert!(matches!(
            frame_request(b"\x00\x01garbage\r\n\r\n"),
            Framing::Reject(_)
        ));
    }
}
