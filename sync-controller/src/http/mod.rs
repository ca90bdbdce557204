//! HTTP endpoints for the controller.
//!
//! Satellite nodes push uplinks and events here; operators read health,
//! metrics and status listings.

pub mod health;
mod metrics;
pub mod status;
mod sync;

use crate::error::InboundError;
use crate::service::SyncService;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;
pub use status::{ObjectStatus, SatelliteStatus};

/// Build the HTTP router with all endpoints.
pub fn build_router(service: Arc<SyncService>) -> Router {
    let mut router = Router::new()
        .route("/uplink", post(sync::uplink_handler))
        .route("/event", post(sync::event_handler))
        .route("/downlink", get(sync::downlink_handler));

    if service.config().http.status_enabled {
        router = router
            .route("/health", get(health::health_handler))
            .route("/metrics", get(metrics::metrics_handler))
            .route("/satellites", get(status::satellites_handler))
            .route("/objects", get(status::objects_handler));
    }

    router.layer(Extension(service))
}

impl IntoResponse for InboundError {
    fn into_response(self) -> Response {
        let status = match self {
            InboundError::Unauthorized => StatusCode::UNAUTHORIZED,
            InboundError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        };
        (status, self.to_string()).into_response()
    }
}
