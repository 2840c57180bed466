use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use ometrics_common::signing::{self, SIGNATURE_HEADER};

use crate::api::error_response;
use crate::logging::{TraceId, MAX_BODY_BYTES};
use crate::state::AppState;

/// Middleware that checks the `HashSHA256` request signature.
///
/// Only signed requests are checked, and only when a key is configured. The
/// signature covers the body exactly as received, before decompression. A
/// mismatch is rejected with 400. The response to a verified request is
/// signed the same way.
pub async fn signature_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(key) = state.signing_key.clone() else {
        return next.run(req).await;
    };
    let Some(signature) = req
        .headers()
        .get(SIGNATURE_HEADER)
        .map(|v| v.to_str().unwrap_or_default().to_string())
    else {
        return next.run(req).await;
    };

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "Cannot read signed request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                "cannot read request body",
            );
        }
    };

    if !signing::verify(&key, &body_bytes, &signature) {
        tracing::warn!(trace_id = %trace_id, "Request rejected: signature mismatch");
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_signature",
            "request signature does not match body",
        );
    }

    let response = next
        .run(Request::from_parts(parts, Body::from(body_bytes)))
        .await;

    let (mut parts, body) = response.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Cannot read response body for signing");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "cannot sign response",
            );
        }
    };
    if let Ok(value) = HeaderValue::from_str(&signing::sign(&key, &body_bytes)) {
        parts.headers.insert(SIGNATURE_HEADER, value);
    }
    Response::from_parts(parts, Body::from(body_bytes))
}
