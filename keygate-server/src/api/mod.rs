use std::sync::Arc;

use axum::{
    body::Body,
    handler::Handler,
    http::{Request, StatusCode, Uri},
    middleware::{self, Next},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use keygate_core::Claims;
use serde_json::json;

use crate::auth::{self, Gate};

pub const HEALTH_URI: &str = "/health";
pub const IDENTITY_URI: &str = "/api/v1/identity";

/// Routes of the demo server. Everything except the health check sits
/// behind `gate`.
pub fn build(gate: Arc<Gate>) -> Router {
    let protected = Router::new()
        .route(IDENTITY_URI, get(identity_handler))
        .route_layer(middleware::from_fn(
            move |req: Request<Body>, next: Next<Body>| auth::require_token(gate.clone(), req, next),
        ));

    Router::new()
        .route(HEALTH_URI, get(health_handler))
        .merge(protected)
        .fallback(not_found_handler.into_service())
}

async fn health_handler() -> &'static str {
    "UP"
}

async fn identity_handler(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    Json(claims)
}

async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "result": "failure",
            "message": "not found",
            "uri": uri.to_string()
        })),
    )
}
