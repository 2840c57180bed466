use anyhow::Result;
use ometrics_common::types::MetricSample;
use ometrics_server::config::ServerConfig;
use ometrics_server::state::Backend;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Span;

#[test]
fn defaults_follow_documented_values() {
    let config: ServerConfig = toml::from_str("").unwrap();
    assert_eq!(config.listen_addr, "0.0.0.0:8080");
    assert_eq!(config.store_interval_secs, 300);
    assert_eq!(config.file_storage_path, "data/metrics.json");
    assert!(!config.restore);
    assert_eq!(config.database.busy_timeout_ms, 5000);
    assert!(config.sqlite_storage().is_none());
    assert!(config.signing_key().is_none());
}

#[test]
fn env_overrides_win_over_file() -> Result<()> {
    let config: ServerConfig = toml::from_str(
        r#"
        listen_addr = "127.0.0.1:9000"
        store_interval_secs = 60

        [database]
        source = "edge-1"
        "#,
    )?;
    let config = config.apply_overrides(|name| match name {
        "ADDRESS" => Some("127.0.0.1:7000".to_string()),
        "STORE_INTERVAL" => Some("0".to_string()),
        "RESTORE" => Some("true".to_string()),
        "DATABASE_PATH" => Some("/tmp/m.db".to_string()),
        "KEY" => Some("k".to_string()),
        _ => None,
    })?;
    config.validate()?;

    assert_eq!(config.listen_addr, "127.0.0.1:7000");
    assert_eq!(config.store_interval_secs, 0);
    assert!(config.restore);
    assert_eq!(config.signing_key(), Some("k"));
    let db = config.sqlite_storage().expect("database path set");
    assert_eq!(db.source, "edge-1");
    assert_eq!(db.busy_timeout, Duration::from_millis(5000));
    Ok(())
}

#[test]
fn invalid_env_values_are_rejected() {
    let result = ServerConfig::default()
        .apply_overrides(|name| (name == "RESTORE").then(|| "maybe".to_string()));
    assert!(result.is_err());
}

#[test]
fn empty_file_path_disables_snapshots() {
    let config = ServerConfig {
        file_storage_path: String::new(),
        ..ServerConfig::default()
    };
    assert!(config.memory_storage().file_path.is_none());
}

#[test]
fn backend_follows_database_path() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let mut config = ServerConfig {
        file_storage_path: dir.path().join("m.json").to_string_lossy().to_string(),
        ..ServerConfig::default()
    };
    assert_eq!(Backend::open(&config)?.name(), "memory");

    config.database.path = Some(dir.path().join("m.db").to_string_lossy().to_string());
    let backend = Backend::open(&config)?;
    assert_eq!(backend.name(), "sqlite");
    assert!(backend
        .spawn_background(CancellationToken::new(), Span::none())
        .is_none());
    Ok(())
}

#[tokio::test]
async fn memory_backend_flushes_on_shutdown_and_restores() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = ServerConfig {
        file_storage_path: dir.path().join("metrics.json").to_string_lossy().to_string(),
        store_interval_secs: 3600,
        restore: true,
        ..ServerConfig::default()
    };

    let backend = Backend::open(&config)?;
    let cancel = CancellationToken::new();
    let flusher = backend
        .spawn_background(cancel.clone(), Span::none())
        .expect("memory backend with a file flushes periodically");
    backend
        .storage()
        .update_metrics(&[MetricSample::counter("PollCount", 4), MetricSample::gauge("Alloc", 1.5)])?;
    cancel.cancel();
    flusher.await?;

    let reopened = Backend::open(&config)?;
    assert_eq!(reopened.storage().get_counter_value("PollCount")?, 4);
    assert_eq!(reopened.storage().get_gauge_value("Alloc")?, 1.5);
    Ok(())
}
