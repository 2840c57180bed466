#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use ometrics_common::types::MetricKind;
use ometrics_server::app;
use ometrics_server::state::AppState;
use ometrics_storage::memory::MemoryStorage;
use ometrics_storage::{MetricStorage, MetricValues, StorageError};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub storage: Arc<dyn MetricStorage>,
    pub app: axum::Router,
}

pub fn build_test_context() -> Result<TestContext> {
    build_test_context_with(Arc::new(MemoryStorage::in_memory()), None)
}

pub fn build_test_context_with(
    storage: Arc<dyn MetricStorage>,
    signing_key: Option<&str>,
) -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let state = AppState::new(storage.clone(), signing_key);
    let app = app::build_http_app(state);
    Ok(TestContext {
        temp_dir,
        storage,
        app,
    })
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn trace_id(&self) -> Option<String> {
        self.headers
            .get("x-trace-id")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
    }
}

pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder
        .body(Body::from(body))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read")
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn request_json(app: &axum::Router, method: &str, uri: &str, body: Value) -> TestResponse {
    send(
        app,
        method,
        uri,
        &[("Content-Type", "application/json")],
        body.to_string().into_bytes(),
    )
    .await
}

pub async fn request_no_body(app: &axum::Router, method: &str, uri: &str) -> TestResponse {
    send(app, method, uri, &[], Vec::new()).await
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// Storage that answers every write with `ResourceBusy`.
pub struct BusyStorage;

impl MetricStorage for BusyStorage {
    fn update_gauge(&self, _name: &str, _value: f64) -> ometrics_storage::Result<()> {
        Err(StorageError::ResourceBusy("database is locked".into()))
    }

    fn update_counter(&self, _name: &str, _delta: i64) -> ometrics_storage::Result<()> {
        Err(StorageError::ResourceBusy("database is locked".into()))
    }

    fn get_gauge_value(&self, name: &str) -> ometrics_storage::Result<f64> {
        Err(StorageError::NotFound {
            kind: MetricKind::Gauge,
            name: name.to_string(),
        })
    }

    fn get_counter_value(&self, name: &str) -> ometrics_storage::Result<i64> {
        Err(StorageError::NotFound {
            kind: MetricKind::Counter,
            name: name.to_string(),
        })
    }

    fn get_all_values(&self) -> ometrics_storage::Result<MetricValues> {
        Ok(MetricValues::default())
    }

    fn ping(&self) -> ometrics_storage::Result<()> {
        Err(StorageError::ResourceBusy("database is locked".into()))
    }
}
