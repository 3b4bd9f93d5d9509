use super::service::Coordinator;
use crate::cluster::{PeerView, StatusSnapshot};

use axum::{Extension, Json, Router, http::StatusCode, routing::get};
use std::sync::Arc;

pub async fn handle_status(
    Extension(coordinator): Extension<Arc<Coordinator>>,
) -> (StatusCode, Json<StatusSnapshot>) {
    (StatusCode::OK, Json(coordinator.status_snapshot()))
}

pub async fn handle_peers(
    Extension(coordinator): Extension<Arc<Coordinator>>,
) -> (StatusCode, Json<Vec<PeerView>>) {
    (StatusCode::OK, Json(coordinator.status_snapshot().peers))
}

/// `GET /status` and `GET /peers`.
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/peers", get(handle_peers))
        .layer(Extension(coordinator))
}
