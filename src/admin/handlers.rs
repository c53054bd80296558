use axum::{extract::State, Json};

use crate::admin::AdminState;
use crate::observability::status::{BackendStatus, StatusSnapshot};

/// Totals and every backend.
pub async fn get_status(State(state): State<AdminState>) -> Json<StatusSnapshot> {
    Json(state.dispatcher.snapshot())
}

/// Backends only, in registry order.
pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    Json(state.dispatcher.snapshot().backends)
}
