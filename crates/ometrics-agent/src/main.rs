use anyhow::Result;
use ometrics_agent::config::AgentConfig;
use ometrics_agent::pipeline::{Pipeline, PipelineConfig, RetryPolicy};
use ometrics_agent::transport::HttpTransport;
use ometrics_collector::source::SampleSource;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ometrics=info".parse()?))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => AgentConfig::load(&path)?,
        None => AgentConfig::default(),
    }
    .apply_env()?;
    config.validate()?;

    tracing::info!(
        server = %config.endpoint_url(),
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        workers = config.worker_count,
        gzip = config.gzip,
        signed = config.signing_key.is_some(),
        "ometrics-agent starting"
    );

    let cancel = CancellationToken::new();

    let (source, sampler) = SampleSource::start(
        ometrics_collector::default_collectors(),
        config.poll_interval(),
        cancel.clone(),
        tracing::info_span!("sampler"),
    );

    let transport = HttpTransport::new(&config.endpoint_url(), config.gzip, config.signing_key.clone())?;
    let pipeline = Pipeline::new(
        Arc::new(source),
        Arc::new(transport),
        PipelineConfig {
            report_interval: config.report_interval(),
            worker_count: config.worker_count,
            retry: RetryPolicy {
                attempt_timeout: config.request_timeout(),
                ..RetryPolicy::default()
            },
        },
        tracing::info_span!("pipeline"),
    );

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutting down gracefully"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    pipeline.send_metrics(cancel).await;
    if let Err(e) = sampler.await {
        tracing::error!(error = %e, "Sampling task failed");
    }

    Ok(())
}
