//! BusySync server
//!
//! Runs scheduled push-out sync and serves live status over WebSocket.

mod context;

use anyhow::Context as _;
use busysync_infra::observability::{init_tracing, LogFormat};
use busysync_infra::realtime::router;
use tracing::{info, warn};

use crate::context::AppContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let format = LogFormat::from_env_value(std::env::var("BUSYSYNC_LOG_FORMAT").ok().as_deref());
    init_tracing(format).context("failed to initialise tracing")?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) => warn!(error = %e, "No .env file loaded"),
    }

    let config = busysync_infra::config::load().context("failed to load configuration")?;
    let mut ctx = AppContext::new(config).await?;
    ctx.start().await?;

    let listener = tokio::net::TcpListener::bind(&ctx.config.realtime.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", ctx.config.realtime.bind_addr))?;
    info!(addr = %ctx.config.realtime.bind_addr, "BusySync server listening");

    let shutdown = ctx.realtime.shutdown.clone();
    let app = router(ctx.realtime.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    info!("Shutdown signal received");
                    shutdown.cancel();
                }
                () = shutdown.cancelled() => {}
            }
        })
        .await
        .context("server error")?;

    ctx.shutdown().await
}
