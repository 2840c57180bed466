use crate::logging::TraceId;
use crate::state::AppState;
use crate::usecase::UseCaseError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ometrics_common::error::MetricError;
use ometrics_common::types::{MetricKind, MetricPayload, MetricQuery, MetricSample, MetricValue};
use serde::Serialize;
use std::fmt::Write;

/// Error envelope returned by every failing endpoint.
#[derive(Serialize)]
pub struct ApiError {
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "invalid_signature" => 1002,
        "not_found" => 1004,
        "invalid_metric_kind" => 1010,
        "invalid_metric_value" => 1011,
        "invalid_payload" => 1012,
        "resource_busy" => 1423,
        "internal_error" => 1500,
        "storage_error" => 1501,
        _ => 1999,
    }
}

/// Maps a storage failure to its HTTP status.
fn usecase_failure(trace_id: &str, err: &UseCaseError) -> Response {
    let msg = err.to_string();
    if err.is_busy() {
        error_response(StatusCode::LOCKED, trace_id, "resource_busy", &msg)
    } else if err.is_not_found() {
        error_response(StatusCode::NOT_FOUND, trace_id, "not_found", &msg)
    } else if err.is_invalid() {
        error_response(StatusCode::BAD_REQUEST, trace_id, "invalid_metric_value", &msg)
    } else {
        tracing::error!(trace_id = %trace_id, error = %err, "Storage operation failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, trace_id, "storage_error", &msg)
    }
}

fn metric_failure(trace_id: &str, err: &MetricError) -> Response {
    let code = match err {
        MetricError::InvalidMetricKind(_) => "invalid_metric_kind",
        MetricError::InvalidValue { .. } => "invalid_metric_value",
        MetricError::MissingValue { .. } => "invalid_payload",
    };
    error_response(StatusCode::BAD_REQUEST, trace_id, code, &err.to_string())
}

fn json_failure(trace_id: &str, rejection: &JsonRejection) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        trace_id,
        "invalid_payload",
        &rejection.body_text(),
    )
}

pub fn metric_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/ping", get(ping))
        .route("/update/:kind/:name/:value", post(update_from_path))
        .route("/update", post(update_from_body))
        .route("/updates", post(update_batch))
        .route("/value/:kind/:name", get(value_from_path))
        .route("/value", post(value_from_body))
}

/// HTML page listing every stored metric.
async fn list_metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> Response {
    let values = match state.metrics.get_all_metrics() {
        Ok(values) => values,
        Err(e) if e.is_not_found() && !e.is_busy() => Default::default(),
        Err(e) => return usecase_failure(&trace_id, &e),
    };

    let mut page = String::from("<html><body>");
    for (name, value) in &values.gauges {
        let _ = write!(page, "<p>{} {value}</p>", escape_html(name));
    }
    for (name, value) in &values.counters {
        let _ = write!(page, "<p>{} {value}</p>", escape_html(name));
    }
    page.push_str("</body></html>");
    Html(page).into_response()
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

async fn ping(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> Response {
    match state.metrics.ping() {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Storage ping failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                &e.to_string(),
            )
        }
    }
}

async fn update_from_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, name, raw)): Path<(String, String, String)>,
) -> Response {
    let sample = match parse_path_sample(&kind, name, &raw) {
        Ok(sample) => sample,
        Err(e) => return metric_failure(&trace_id, &e),
    };
    match state.metrics.update_metric(&sample) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => usecase_failure(&trace_id, &e),
    }
}

fn parse_path_sample(kind: &str, name: String, raw: &str) -> Result<MetricSample, MetricError> {
    let kind: MetricKind = kind.parse()?;
    let value = MetricValue::parse(kind, raw)?;
    Ok(MetricSample { name, value })
}

async fn update_from_body(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    payload: Result<Json<MetricPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return json_failure(&trace_id, &rejection),
    };
    let sample = match MetricSample::try_from(payload) {
        Ok(sample) => sample,
        Err(e) => return metric_failure(&trace_id, &e),
    };
    match state.metrics.update_metric(&sample) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => usecase_failure(&trace_id, &e),
    }
}

/// Converts the whole batch before storing any of it: one malformed entry
/// rejects the request.
async fn update_batch(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    payload: Result<Json<Vec<MetricPayload>>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return json_failure(&trace_id, &rejection),
    };
    let batch = match payload
        .into_iter()
        .map(MetricSample::try_from)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(batch) => batch,
        Err(e) => return metric_failure(&trace_id, &e),
    };

    match state.metrics.update_metrics(&batch) {
        Ok(()) => {
            tracing::debug!(trace_id = %trace_id, count = batch.len(), "Batch stored");
            StatusCode::OK.into_response()
        }
        Err(e) => usecase_failure(&trace_id, &e),
    }
}

async fn value_from_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let kind: MetricKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return metric_failure(&trace_id, &e),
    };
    match state.metrics.get_metric(kind, &name) {
        Ok(sample) => sample.value.to_string().into_response(),
        Err(e) => usecase_failure(&trace_id, &e),
    }
}

async fn value_from_body(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    query: Result<Json<MetricQuery>, JsonRejection>,
) -> Response {
    let Json(query) = match query {
        Ok(query) => query,
        Err(rejection) => return json_failure(&trace_id, &rejection),
    };
    let kind: MetricKind = match query.kind.parse() {
        Ok(kind) => kind,
        Err(e) => return metric_failure(&trace_id, &e),
    };
    match state.metrics.get_metric(kind, &query.id) {
        Ok(sample) => Json(MetricPayload::from(&sample)).into_response(),
        Err(e) => usecase_failure(&trace_id, &e),
    }
}
