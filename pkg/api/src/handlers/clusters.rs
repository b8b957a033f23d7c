use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use pkg_constants::state::CLUSTER_WIDE_SCOPE;
use pkg_types::{Cluster, LabelSelector};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

/// PUT /api/v1/clusters/{name}
///
/// Create or replace a cluster's labels and allocatable capacity.
pub async fn put_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut cluster): Json<Cluster>,
) -> Result<(StatusCode, Json<Cluster>), ApiError> {
    cluster.metadata.name = name.clone();
    cluster.metadata.scope = None;
    // surface malformed overcommit labels now rather than at the next login
    cluster.overcommit()?;

    let clusters = &state.registries.clusters;
    match clusters.try_get(CLUSTER_WIDE_SCOPE, &name).await? {
        Some(existing) => {
            cluster.metadata.resource_version = existing.metadata.resource_version;
            let updated = clusters.update(cluster).await?;
            info!("updated cluster {}", name);
            Ok((StatusCode::OK, Json(updated)))
        }
        None => {
            let created = clusters.create(cluster).await?;
            info!("registered cluster {}", name);
            Ok((StatusCode::CREATED, Json(created)))
        }
    }
}

/// GET /api/v1/clusters
pub async fn list_clusters(State(state): State<AppState>) -> Json<Vec<Cluster>> {
    Json(
        state
            .listers
            .clusters
            .list(None, &LabelSelector::everything())
            .await,
    )
}
