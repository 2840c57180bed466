use crate::api::error_response;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::time::Instant;

/// Per-request correlation id, stored in request extensions and echoed in
/// the [`TRACE_ID_HEADER`] response header.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    fn random() -> Self {
        Self(format!("{:016x}", rand::thread_rng().gen::<u64>()))
    }
}

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Largest request or response body buffered by the middleware stack.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Characters of a body included in log lines.
const BODY_PREVIEW_CHARS: usize = 200;

/// Log-friendly preview of a body: the first few characters of UTF-8 text,
/// or a size marker for anything else.
fn body_preview(bytes: &[u8]) -> String {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return format!("<{} bytes>", bytes.len());
    };
    match text.char_indices().nth(BODY_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Request/response logging middleware. Tags every request with a
/// [`TraceId`] and echoes it in the `X-Trace-Id` response header.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::random();
    req.extensions_mut().insert(trace_id.clone());

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let encoding = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, method = %method, path = %path, error = %e, "--> request body rejected");
            let mut response = error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &trace_id,
                "bad_request",
                "request body too large or unreadable",
            );
            set_trace_header(&mut response, &trace_id);
            return response;
        }
    };

    if body_bytes.is_empty() {
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %path,
            "--> request"
        );
    } else {
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %path,
            encoding = %encoding,
            body = %body_preview(&body_bytes),
            "--> request"
        );
    }
    let req = Request::from_parts(parts, Body::from(body_bytes));

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    let (parts, body) = response.into_parts();
    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    let is_encoded = parts.headers.contains_key(header::CONTENT_ENCODING);

    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let body_snippet = if is_json && !is_encoded && !body_bytes.is_empty() {
        body_preview(&body_bytes)
    } else {
        String::new()
    };

    let status_code = status.as_u16();
    if status.is_server_error() {
        tracing::error!(
            trace_id = %trace_id,
            status = status_code,
            elapsed_ms,
            body = %body_snippet,
            "<-- response"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            trace_id = %trace_id,
            status = status_code,
            elapsed_ms,
            body = %body_snippet,
            "<-- response"
        );
    } else {
        tracing::info!(
            trace_id = %trace_id,
            status = status_code,
            elapsed_ms,
            "<-- response"
        );
    }

    let mut response = Response::from_parts(parts, Body::from(body_bytes));
    set_trace_header(&mut response, &trace_id);
    response
}

fn set_trace_header(response: &mut Response, trace_id: &str) {
    if let Ok(val) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, val);
    }
}
