use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use askcorpus_lib::responder::Assistant;

use crate::router::build_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub assistant: Arc<dyn Assistant>,
    pub top_k: usize,
}

fn socket_addr(bind: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = bind
        .trim()
        .parse()
        .with_context(|| format!("server.bind '{bind}' is not an IP address"))?;
    Ok(SocketAddr::from((ip, port)))
}

/// Serve the HTTP API until ctrl-c.
///
/// The index is prepared in the background so `/health` answers straight
/// away; requests that arrive first wait on the same initialization.
pub(crate) async fn serve(assistant: Arc<dyn Assistant>, top_k: usize, bind: &str, port: u16) -> anyhow::Result<()> {
    let addr = socket_addr(bind, port)?;

    let warmup = Arc::clone(&assistant);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = warmup.ensure_ready() {
            tracing::warn!(error = %e, "background initialization failed, will retry on first request");
        }
    });

    let router = build_router(AppState { assistant, top_k });
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
