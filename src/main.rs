//! cachet binary entry point.
//!
//! Wires the caching core (Redis store, HTTP origin client, resolver) to
//! the HTTP front end and serves until terminated.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cachet::config::ProxyConfig;
use cachet::middleware::{Chain, RequestLogger, from_fn};
use cachet::origin::{HttpOrigin, Origin};
use cachet::proxy::ProxyApp;
use cachet::security::CorsMiddleware;
use cachet::server::Server;
use cachet::store::{RedisStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::load().context("loading configuration")?;
    info!(origin = %config.origin, redis = %config.redis_url, "starting cachet");

    let store: Arc<dyn Store> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("connecting to redis")?,
    );
    let origin: Arc<dyn Origin> = Arc::new(
        HttpOrigin::with_timeout(
            &config.origin,
            Duration::from_millis(config.origin_timeout_ms),
        )
        .context("building origin client")?,
    );

    let app = Arc::new(ProxyApp::new(store, origin));
    let chain = Chain::new()
        .layer(RequestLogger)
        .layer(CorsMiddleware::new())
        .mount(from_fn(move |request| {
            let app = Arc::clone(&app);
            async move { app.handle(request).await }
        }));

    let server = Server::bind(&config.listen)
        .await
        .context("binding listen address")?;
    info!(address = %server.local_addr(), "caching proxy ready");

    server
        .run(move |request| {
            let chain = chain.clone();
            async move { chain.run(request).await }
        })
        .await
        .context("serving")?;

    Ok(())
}
