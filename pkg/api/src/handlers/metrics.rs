use axum::{extract::State, http::header, response::IntoResponse};
use pkg_metrics::PROJECT_LOCKS;

use crate::AppState;

/// GET /metrics
/// Prometheus text exposition.
pub async fn render(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .gauge_set(PROJECT_LOCKS, state.locks.len() as i64);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
