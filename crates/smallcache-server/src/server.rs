use std::net::SocketAddr;

use anyhow::{Context, Result};
use smallcache::config::Config;

use crate::endpoints;
use crate::service::Service;

/// Creates the groups of this shard and serves them until the process is stopped.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    smallcache::metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("smallcache-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let service = {
        let _guard = web_pool.enter();
        Service::create(&config).context("failed to create HTTP service state")?
    };

    let socket = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address `{}`", config.bind))?;
    let server =
        axum_server::bind(socket).serve(endpoints::create_app(service).into_make_service());
    tracing::info!("Starting HTTP server on {}", socket);

    web_pool.block_on(server)?;
    tracing::info!("System shutdown complete");

    Ok(())
}
