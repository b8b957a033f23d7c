use pkg_constants::labels::{
    PROJECT_ID_ANNOTATION, PROJECT_ID_LABEL, RESOURCE_QUOTA_ANNOTATION, TENANT_NAMESPACE_LABEL,
};
use pkg_constants::state::CLUSTER_WIDE_SCOPE;
use pkg_quota::fit::{fits_cluster_with_overcommit, fits_within_parent, validate_namespace_default};
use pkg_quota::{ProjectClaim, QuotaError, ResourceLimitSet};
use pkg_state::{ProjectLockRegistry, Registries};
use pkg_types::meta::Resource;
use pkg_types::project::split_project_id;
use pkg_types::{LabelSelector, Namespace, Project};
use tracing::{debug, info};

use crate::error::AdmissionError;

const QUOTA_FIELD: &str = "resourceQuota";
const NAMESPACE_QUOTA_FIELD: &str = "namespaceDefaultResourceQuota";

/// Quota checks for project create/update and namespace moves between
/// projects.
#[derive(Clone)]
pub struct QuotaAdmission {
    registries: Registries,
    locks: ProjectLockRegistry,
}

impl QuotaAdmission {
    pub fn new(registries: Registries, locks: ProjectLockRegistry) -> Self {
        Self { registries, locks }
    }

    /// Validate the quota carried by `project` without writing it. A stored
    /// project with the same id makes this an update.
    ///
    /// Runs under the cluster lock that tenant provisioning also takes, so the
    /// cluster aggregate cannot move while it is checked.
    pub async fn validate_project(&self, project: &Project) -> Result<(), AdmissionError> {
        let _cluster = self.locks.acquire(project.scope()).await;
        self.check_project(project).await.map(|_| ())
    }

    /// Validate `project` and write it (create, or update of the stored
    /// version) before the cluster lock is released.
    pub async fn admit_project(&self, project: Project) -> Result<Project, AdmissionError> {
        let _cluster = self.locks.acquire(project.scope()).await;
        let stored = match self.check_project(&project).await? {
            Some(_) => self.registries.projects.update(project).await?,
            None => self.registries.projects.create(project).await?,
        };
        info!(
            "admitted project {} at version {}",
            stored.id(),
            stored.metadata.resource_version
        );
        Ok(stored)
    }

    /// The quota checks proper. Returns the stored project, if any. Callers
    /// hold the cluster lock.
    async fn check_project(&self, project: &Project) -> Result<Option<Project>, AdmissionError> {
        let existing = self
            .registries
            .projects
            .try_get(project.scope(), project.name())
            .await?;
        let (limit, namespace_default) =
            match (project.quota_limit(), project.namespace_default_limit()) {
                (None, None) => return Ok(existing),
                (Some(_), None) => {
                    return Err(QuotaError::missing_field(
                        NAMESPACE_QUOTA_FIELD,
                        format!("must be set together with {}", QUOTA_FIELD),
                    )
                    .into());
                }
                (None, Some(_)) => {
                    return Err(QuotaError::missing_field(
                        QUOTA_FIELD,
                        format!("must be set together with {}", NAMESPACE_QUOTA_FIELD),
                    )
                    .into());
                }
                (Some(limit), Some(namespace_default)) => (limit, namespace_default),
            };

        validate_namespace_default(limit, namespace_default)?;

        let report = fits_within_parent(namespace_default, &[], limit)?;
        if !report.fits {
            return Err(QuotaError::exceeded(
                NAMESPACE_QUOTA_FIELD,
                format!("exceeds {} on fields: {}", QUOTA_FIELD, report.message()),
            )
            .into());
        }

        if let Some(existing) = &existing {
            self.validate_update(project, existing, limit, namespace_default)
                .await?;
        }

        self.validate_cluster_fit(project, limit).await?;
        Ok(existing)
    }

    async fn validate_update(
        &self,
        project: &Project,
        existing: &Project,
        limit: &ResourceLimitSet,
        namespace_default: &ResourceLimitSet,
    ) -> Result<(), AdmissionError> {
        let stored_used = existing
            .spec
            .resource_quota
            .as_ref()
            .map(|q| q.used_limit.clone())
            .unwrap_or_default();
        // keys dropped from the namespace default no longer count as used
        let used = stored_used.filtered(|key| namespace_default.contains(key));
        let added = namespace_default.filtered(|key| !stored_used.contains(key));
        let removed = stored_used.len() - used.len();

        // namespace moves into this project take the project lock
        let project_id = project.id();
        let _project = self.locks.acquire(&project_id).await;

        let report = fits_within_parent(&used, &[], limit)?;
        if !report.fits {
            return Err(QuotaError::exceeded(
                QUOTA_FIELD,
                format!("is below the used limit on fields: {}", report.message()),
            )
            .into());
        }

        if added.is_empty() && removed == 0 {
            return Ok(());
        }
        let namespaces = self.namespaces_of(project).await?;
        debug!(
            "project {} adds {} keys over {} namespaces",
            project_id,
            added.len(),
            namespaces.len()
        );
        let per_namespace = vec![added; namespaces.len()];
        let report = fits_within_parent(&ResourceLimitSet::new(), &per_namespace, limit)?;
        if !report.fits {
            return Err(QuotaError::exceeded(
                NAMESPACE_QUOTA_FIELD,
                format!(
                    "exceeds project limit on fields {} when applied to all namespaces in a project",
                    report.message()
                ),
            )
            .into());
        }
        Ok(())
    }

    async fn validate_cluster_fit(
        &self,
        project: &Project,
        limit: &ResourceLimitSet,
    ) -> Result<(), AdmissionError> {
        let cluster = self
            .registries
            .clusters
            .get(CLUSTER_WIDE_SCOPE, project.scope())
            .await?;
        let others: Vec<ProjectClaim> = self
            .registries
            .projects
            .list(Some(project.scope()), &LabelSelector::everything())
            .await?
            .iter()
            .filter_map(Project::claim)
            .collect();
        let candidate = ProjectClaim::new(project.id(), limit.clone());
        let report = fits_cluster_with_overcommit(
            &candidate,
            &others,
            &cluster.status.allocatable,
            cluster.overcommit()?,
        )?;
        if !report.fits {
            return Err(QuotaError::exceeded(
                QUOTA_FIELD,
                format!("exceeds cluster allocatable on fields: {}", report.message()),
            )
            .into());
        }
        Ok(())
    }

    async fn namespaces_of(&self, project: &Project) -> Result<Vec<Namespace>, AdmissionError> {
        let project_id = project.id();
        Ok(self
            .registries
            .namespaces
            .list(Some(project.scope()), &LabelSelector::everything())
            .await?
            .into_iter()
            .filter(|ns| ns.project_id() == Some(project_id.as_str()))
            .collect())
    }

    /// Move a namespace into `target` (a `<cluster>:<project>` id), or out of
    /// any project when `target` is `None`.
    pub async fn move_namespace(
        &self,
        cluster_name: &str,
        namespace_name: &str,
        target: Option<&str>,
    ) -> Result<Namespace, AdmissionError> {
        let mut namespace = self
            .registries
            .namespaces
            .get(cluster_name, namespace_name)
            .await?;

        let Some(target) = target else {
            let meta = &mut namespace.metadata;
            meta.annotations.remove(PROJECT_ID_ANNOTATION);
            meta.annotations.remove(RESOURCE_QUOTA_ANNOTATION);
            meta.labels.remove(TENANT_NAMESPACE_LABEL);
            meta.labels.remove(PROJECT_ID_LABEL);
            let moved = self.registries.namespaces.update(namespace).await?;
            info!("moved namespace {}/{} out of its project", cluster_name, namespace_name);
            return Ok(moved);
        };

        let (project_cluster, project_name) = split_project_id(target)
            .ok_or_else(|| AdmissionError::Invalid(format!("invalid project id {:?}", target)))?;
        if project_cluster != cluster_name {
            return Err(AdmissionError::Invalid(format!(
                "project {} is not on cluster {}",
                target, cluster_name
            )));
        }
        let _lock = self.locks.acquire(target).await;
        let project = self
            .registries
            .projects
            .get(project_cluster, project_name)
            .await?;

        let meta = &mut namespace.metadata;
        meta.annotations
            .insert(PROJECT_ID_ANNOTATION.to_string(), project.id());
        match project.tenant_id() {
            Some(tenant) => {
                meta.labels
                    .insert(TENANT_NAMESPACE_LABEL.to_string(), tenant.to_string());
            }
            None => {
                meta.labels.remove(TENANT_NAMESPACE_LABEL);
            }
        }
        match project.quota_limit() {
            Some(limit) => {
                meta.annotations.insert(
                    RESOURCE_QUOTA_ANNOTATION.to_string(),
                    limit.zeroed().to_annotation()?,
                );
            }
            None => {
                meta.annotations.remove(RESOURCE_QUOTA_ANNOTATION);
            }
        }
        let moved = self.registries.namespaces.update(namespace).await?;
        info!(
            "moved namespace {}/{} into project {}",
            cluster_name, namespace_name, target
        );
        Ok(moved)
    }
}
