use crate::state::AppState;
use crate::{api, logging, middleware};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Builds the HTTP application. Layers, outermost first: request logging,
/// signature check, gzip request decompression, gzip response compression.
pub fn build_http_app(state: AppState) -> Router {
    api::metric_routes()
        .layer(CompressionLayer::new())
        .layer(RequestDecompressionLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::signature_middleware,
        ))
        .layer(axum::middleware::from_fn(logging::request_logging))
        .with_state(state)
}
