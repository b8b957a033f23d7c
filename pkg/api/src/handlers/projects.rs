use axum::{
    Json,
    extract::{Path, State},
};
use pkg_controllers::AdmissionError;
use pkg_metrics::QUOTA_REJECTIONS;
use pkg_types::Project;
use pkg_types::meta::Resource;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::AppState;
use crate::error::ApiError;

/// POST /api/v1/projects/validate
///
/// Run quota admission for a project create or update without writing it.
pub async fn validate(
    State(state): State<AppState>,
    Json(project): Json<Project>,
) -> Result<Json<Value>, ApiError> {
    if project.name().is_empty() || project.meta().scope.is_none() {
        return Err(ApiError::BadRequest(
            "project name and cluster scope are required".to_string(),
        ));
    }
    match state.admission.validate_project(&project).await {
        Ok(()) => {
            debug!("project {} admitted", project.id());
            Ok(Json(json!({ "allowed": true })))
        }
        Err(e) => {
            info!("project {} rejected: {}", project.id(), e);
            state
                .metrics
                .counter_inc(QUOTA_REJECTIONS, &[("source", "admission")]);
            Err(e.into())
        }
    }
}

/// PUT /api/v1/projects/{cluster}/{name}
///
/// Run quota admission and store the project in one step.
pub async fn put_project(
    State(state): State<AppState>,
    Path((cluster, name)): Path<(String, String)>,
    Json(mut project): Json<Project>,
) -> Result<Json<Project>, ApiError> {
    project.metadata.name = name;
    project.metadata.scope = Some(cluster.clone());
    project.spec.cluster_name = cluster;
    match state.admission.admit_project(project).await {
        Ok(stored) => Ok(Json(stored)),
        Err(e) => {
            info!("project write rejected: {}", e);
            if matches!(e, AdmissionError::Quota(_)) {
                state
                    .metrics
                    .counter_inc(QUOTA_REJECTIONS, &[("source", "admission")]);
            }
            Err(e.into())
        }
    }
}
