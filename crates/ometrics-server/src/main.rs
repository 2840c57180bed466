use anyhow::Result;
use ometrics_server::app;
use ometrics_server::config::ServerConfig;
use ometrics_server::state::{AppState, Backend};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ometrics=info".parse()?))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    }
    .apply_env()?;
    config.validate()?;

    let backend = Backend::open(&config)?;
    tracing::info!(
        addr = %config.listen_addr,
        backend = backend.name(),
        store_interval_secs = config.store_interval_secs,
        restore = config.restore,
        signed = config.signing_key().is_some(),
        "ometrics-server starting"
    );

    let cancel = CancellationToken::new();
    let flusher = backend.spawn_background(cancel.clone(), tracing::info_span!("flush"));

    let state = AppState::new(backend.storage(), config.signing_key());
    let app = app::build_http_app(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "HTTP server listening");

    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => tracing::info!("Shutting down gracefully"),
                _ = shutdown.cancelled() => {}
            }
        })
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server error");
    }

    cancel.cancel();
    match flusher {
        Some(handle) => {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Flush task failed");
            }
        }
        None => backend.close(),
    }

    served?;
    Ok(())
}
