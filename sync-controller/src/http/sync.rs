//! Inbound endpoints called by satellite nodes.
//!
//! Bodies are read raw and decoded here so a malformed payload is a plain
//! 400 with a logged reason, never a mutation.

use crate::service::SyncService;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use sync_types::{DownlinkPoll, EventPush, UplinkPush};

/// Body returned by accepted pushes.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    /// Always `"ok"`.
    pub status: &'static str,
}

const ACK: Ack = Ack { status: "ok" };

fn decode<T: DeserializeOwned>(endpoint: &str, body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Malformed {} body: {}", endpoint, e);
        (StatusCode::BAD_REQUEST, format!("malformed body: {e}")).into_response()
    })
}

/// `POST /uplink`: full report from a node.
pub async fn uplink_handler(
    Extension(service): Extension<Arc<SyncService>>,
    body: Bytes,
) -> Response {
    let payload: UplinkPush = match decode("uplink", &body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    match service.handle_uplink(&payload).await {
        Ok(_) => Json(ACK).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /event`: one event on a node-owned object.
pub async fn event_handler(
    Extension(service): Extension<Arc<SyncService>>,
    body: Bytes,
) -> Response {
    let payload: EventPush = match decode("event", &body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    match service.handle_event(payload).await {
        Ok(_) => Json(ACK).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /downlink`: legacy command poll.
pub async fn downlink_handler(
    Extension(service): Extension<Arc<SyncService>>,
    body: Bytes,
) -> Response {
    let payload: DownlinkPoll = match decode("downlink", &body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    match service.handle_downlink_poll(&payload) {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => e.into_response(),
    }
}
