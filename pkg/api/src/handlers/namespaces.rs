use axum::{
    Json,
    extract::{Path, State},
};
use pkg_types::Namespace;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    /// `<cluster>:<project>`, or absent to move the namespace out of its project.
    #[serde(default)]
    pub project_id: Option<String>,
}

/// POST /api/v1/namespaces/{cluster}/{name}/move
pub async fn move_namespace(
    State(state): State<AppState>,
    Path((cluster, name)): Path<(String, String)>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<Namespace>, ApiError> {
    let target = req.project_id.as_deref().filter(|id| !id.is_empty());
    let moved = state
        .admission
        .move_namespace(&cluster, &name, target)
        .await?;
    Ok(Json(moved))
}
