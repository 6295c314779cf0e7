use ::http::{header, HeaderValue, Method};
use axum::http::StatusCode;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domain::repository::StorageKind;
use crate::http::routes::health::health;
use crate::http::types::ApiError;

/// Mounts the todo routes under `/api/todos` next to `/api/health`.
pub fn app(todos: Router, storage: StorageKind) -> Router {
    Router::new()
        .route("/api/health", get(health).fallback(route_not_found))
        .with_state(storage)
        .nest("/api/todos", todos)
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
}

pub fn cors(frontend_url: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(frontend_url)?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

/// Unknown paths and unsupported methods on known paths both land here.
pub(crate) async fn route_not_found() -> ApiError { ApiError::new(StatusCode::NOT_FOUND, "Route not found") }
