use pkg_constants::labels::{
    CREATOR_ID_ANNOTATION, PROJECT_ID_ANNOTATION, TENANT_ID_LABEL, TENANT_NAMESPACE_LABEL,
};
use pkg_constants::quota::{
    NAMESPACE_READY_TIMEOUT_MS, PROJECT_LOCK_TTL_SECS, PROJECT_NAME_PREFIX,
    PROJECT_READY_TIMEOUT_MS, READY_POLL_INTERVAL_MS,
};
use pkg_quota::{ProjectClaim, ResourceLimitSet, fit::fits_cluster_with_overcommit};
use pkg_state::{Listers, ProjectLockRegistry, Registries};
use pkg_types::config::{ServerConfigFile, default_tenant_quota};
use pkg_types::meta::Resource;
use pkg_types::project::project_id;
use pkg_types::{Cluster, IdentityAssertion, LabelSelector, Project};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ProvisionError, ResourceQuotaExceedError};
use crate::wait::{WaitOutcome, await_condition};

/// Timings and defaults for tenant project provisioning.
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    pub poll_interval: Duration,
    pub project_ready_timeout: Duration,
    pub namespace_ready_timeout: Duration,
    pub lock_ttl: Duration,
    /// Quota (and namespace default) given to newly created tenant projects.
    pub tenant_quota: ResourceLimitSet,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(READY_POLL_INTERVAL_MS),
            project_ready_timeout: Duration::from_millis(PROJECT_READY_TIMEOUT_MS),
            namespace_ready_timeout: Duration::from_millis(NAMESPACE_READY_TIMEOUT_MS),
            lock_ttl: Duration::from_secs(PROJECT_LOCK_TTL_SECS),
            tenant_quota: default_tenant_quota(),
        }
    }
}

impl ProvisioningSettings {
    pub fn from_config(config: &ServerConfigFile) -> Self {
        let defaults = Self::default();
        let file = config.provisioning.clone().unwrap_or_default();
        Self {
            poll_interval: file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            project_ready_timeout: file
                .project_ready_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.project_ready_timeout),
            namespace_ready_timeout: file
                .namespace_ready_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.namespace_ready_timeout),
            lock_ttl: file
                .lock_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_ttl),
            tenant_quota: config
                .tenant_quota
                .clone()
                .filter(|quota| !quota.is_empty())
                .unwrap_or(defaults.tenant_quota),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionedProject {
    pub project: Project,
    /// False when the project already existed (or another login won the race).
    pub created: bool,
    pub project_ready: bool,
    pub namespaces_linked: bool,
}

/// Finds or creates a tenant's project on one cluster and waits for it to
/// become usable.
#[derive(Clone)]
pub struct TenantProvisioner {
    registries: Registries,
    listers: Listers,
    locks: ProjectLockRegistry,
    settings: ProvisioningSettings,
}

impl TenantProvisioner {
    pub fn new(
        registries: Registries,
        listers: Listers,
        locks: ProjectLockRegistry,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            registries,
            listers,
            locks,
            settings,
        }
    }

    pub fn settings(&self) -> &ProvisioningSettings {
        &self.settings
    }

    /// Lookup, then (if missing) quota check and create, then wait for the
    /// project and the tenant's namespaces. Readiness timeouts are logged and
    /// reported in the result; only cancellation turns them into an error.
    pub async fn ensure_project(
        &self,
        cluster: &Cluster,
        identity: &IdentityAssertion,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedProject, ProvisionError> {
        let cluster_name = cluster.name();
        let tenant_selector =
            LabelSelector::everything().with_label(TENANT_ID_LABEL, identity.tenant_id.as_str());

        let cached = self
            .listers
            .projects
            .list(Some(cluster_name), &tenant_selector)
            .await
            .into_iter()
            .find(|p| p.spec.display_name == identity.tenant_short_name);

        let (project, created) = match cached {
            Some(project) => {
                debug!("found project {} for tenant {}", project.id(), identity.tenant_id);
                (project, false)
            }
            None => self.create_project(cluster, identity, &tenant_selector).await?,
        };

        let (project_ready, namespaces) = tokio::join!(
            self.await_project_ready(&project, cancel),
            self.link_tenant_namespaces(&project, identity, cancel),
        );
        let (namespaces, link_failed) = match namespaces {
            Ok(outcome) => (outcome, false),
            Err(e) => {
                warn!(
                    "failed to link tenant {} namespaces to project {}: {}",
                    identity.tenant_id,
                    project.id(),
                    e
                );
                (WaitOutcome::NotReady, true)
            }
        };
        if project_ready == WaitOutcome::Cancelled || namespaces == WaitOutcome::Cancelled {
            return Err(ProvisionError::Cancelled(format!("project {}", project.id())));
        }
        if project_ready == WaitOutcome::NotReady {
            warn!(
                "timeout waiting for project {} to become namespace-backed",
                project.id()
            );
        }
        if namespaces == WaitOutcome::NotReady && !link_failed {
            warn!(
                "timeout waiting for tenant {} namespaces to link to project {}",
                identity.tenant_id,
                project.id()
            );
        }

        let refreshed = self
            .listers
            .projects
            .get(cluster_name, project.name())
            .await;
        let project = refreshed.unwrap_or(project);
        Ok(ProvisionedProject {
            project,
            created,
            project_ready: project_ready == WaitOutcome::Ready,
            namespaces_linked: namespaces == WaitOutcome::Ready,
        })
    }

    async fn create_project(
        &self,
        cluster: &Cluster,
        identity: &IdentityAssertion,
        tenant_selector: &LabelSelector,
    ) -> Result<(Project, bool), ProvisionError> {
        let cluster_name = cluster.name();
        let _lock = self.locks.acquire(cluster_name).await;

        // the cache may trail a create made by a concurrent login
        let existing = self
            .registries
            .projects
            .list(Some(cluster_name), tenant_selector)
            .await?
            .into_iter()
            .find(|p| p.spec.display_name == identity.tenant_short_name);
        if let Some(project) = existing {
            debug!("project {} appeared while waiting for the lock", project.id());
            return Ok((project, false));
        }

        let name = project_name(cluster_name, identity);
        let quota = self.settings.tenant_quota.clone();
        let mut project = Project::new(cluster_name, &name, &identity.tenant_short_name)
            .with_quota(quota.clone(), quota.clone());
        project
            .metadata
            .labels
            .insert(TENANT_ID_LABEL.to_string(), identity.tenant_id.clone());
        project
            .metadata
            .annotations
            .insert(CREATOR_ID_ANNOTATION.to_string(), identity.principal_id.clone());

        let others: Vec<ProjectClaim> = self
            .registries
            .projects
            .list(Some(cluster_name), &LabelSelector::everything())
            .await?
            .iter()
            .filter_map(Project::claim)
            .collect();
        let candidate = ProjectClaim::new(project_id(cluster_name, &name), quota);
        let report = fits_cluster_with_overcommit(
            &candidate,
            &others,
            &cluster.status.allocatable,
            cluster.overcommit()?,
        )?;
        if !report.fits {
            warn!(
                "project for tenant {} does not fit cluster {}: {}",
                identity.tenant_id,
                cluster_name,
                report.message()
            );
            return Err(ResourceQuotaExceedError {
                message: report.message(),
            }
            .into());
        }

        match self.registries.projects.create(project).await {
            Ok(project) => {
                info!(
                    "created project {} for tenant {} ({})",
                    project.id(),
                    identity.tenant_id,
                    identity.tenant_short_name
                );
                Ok((project, true))
            }
            Err(e) if e.is_already_exists() => {
                debug!("project {} already exists: {}", name, e);
                let winner = self.registries.projects.get(cluster_name, &name).await?;
                Ok((winner, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn await_project_ready(&self, project: &Project, cancel: &CancellationToken) -> WaitOutcome {
        let scope = project.scope().to_string();
        let name = project.name().to_string();
        await_condition(
            || {
                let lister = self.listers.projects.clone();
                let (scope, name) = (scope.clone(), name.clone());
                async move {
                    lister
                        .get(&scope, &name)
                        .await
                        .is_some_and(|p| p.is_namespace_backed())
                }
            },
            self.settings.poll_interval,
            self.settings.project_ready_timeout,
            cancel,
        )
        .await
    }

    /// Point every tenant namespace on the project's cluster at the project,
    /// then wait for the project controller to confirm each link.
    async fn link_tenant_namespaces(
        &self,
        project: &Project,
        identity: &IdentityAssertion,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, ProvisionError> {
        let cluster_name = project.scope().to_string();
        let project_id = project.id();
        let selector = LabelSelector::everything()
            .with_label(TENANT_NAMESPACE_LABEL, identity.tenant_id.as_str());

        let namespaces = self
            .registries
            .namespaces
            .list(Some(&cluster_name), &selector)
            .await?;
        for mut ns in namespaces {
            if ns.project_id() == Some(project_id.as_str()) {
                continue;
            }
            ns.metadata
                .annotations
                .insert(PROJECT_ID_ANNOTATION.to_string(), project_id.clone());
            let ns_name = ns.name().to_string();
            match self.registries.namespaces.update(ns).await {
                Ok(_) => info!("assigned namespace {}/{} to {}", cluster_name, ns_name, project_id),
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    debug!("namespace {} changed while assigning: {}", ns_name, e)
                }
                Err(e) => return Err(e.into()),
            }
        }

        let outcome = await_condition(
            || {
                let lister = self.listers.namespaces.clone();
                let (cluster_name, selector, project) =
                    (cluster_name.clone(), selector.clone(), project.clone());
                async move {
                    lister
                        .list(Some(&cluster_name), &selector)
                        .await
                        .iter()
                        .filter(|ns| ns.project_id() == Some(project.id().as_str()))
                        .all(|ns| ns.is_linked_to(&project))
                }
            },
            self.settings.poll_interval,
            self.settings.namespace_ready_timeout,
            cancel,
        )
        .await;
        Ok(outcome)
    }
}

/// Stable project name per (cluster, tenant, display name): concurrent
/// logins for the same tenant race on one key.
fn project_name(cluster_name: &str, identity: &IdentityAssertion) -> String {
    let seed = format!(
        "{}/{}/{}",
        cluster_name, identity.tenant_id, identity.tenant_short_name
    );
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
        .simple()
        .to_string();
    format!("{}{}", PROJECT_NAME_PREFIX, &id[..10])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectController;
    use pkg_quota::ResourceKey;
    use pkg_state::client::WriteOp;
    use pkg_state::{Registry, StateStore};
    use pkg_types::Namespace;
    use std::collections::BTreeMap;

    struct Fixture {
        registries: Registries,
        provisioner: TenantProvisioner,
    }

    async fn fixture(tenant_quota: ResourceLimitSet) -> Fixture {
        let store = StateStore::in_memory();
        let registries = Registries::new(&store);
        let listers = Listers::start(&store).await.unwrap();
        let settings = ProvisioningSettings {
            tenant_quota,
            ..Default::default()
        };
        let provisioner = TenantProvisioner::new(
            registries.clone(),
            listers,
            ProjectLockRegistry::new(settings.lock_ttl),
            settings,
        );
        Fixture {
            registries,
            provisioner,
        }
    }

    fn small_quota() -> ResourceLimitSet {
        ResourceLimitSet::new()
            .with(ResourceKey::LimitsCpu, "2")
            .with(ResourceKey::LimitsMemory, "4Gi")
    }

    fn cluster() -> Cluster {
        Cluster::new("c1", "east")
            .with_allocatable("cpu", "8")
            .with_allocatable("memory", "32Gi")
    }

    fn identity() -> IdentityAssertion {
        IdentityAssertion {
            tenant_id: "t-1".into(),
            tenant_short_name: "acme".into(),
            principal_id: "u-1".into(),
            username: None,
            cluster_actions: BTreeMap::new(),
        }
    }

    fn start_controller(registries: &Registries) -> CancellationToken {
        let cancel = CancellationToken::new();
        ProjectController::new(registries.clone())
            .with_interval(Duration::from_millis(100))
            .start(cancel.clone());
        cancel
    }

    #[tokio::test(start_paused = true)]
    async fn creates_project_and_waits_for_controller() {
        let f = fixture(small_quota()).await;
        let stop = start_controller(&f.registries);

        let result = f
            .provisioner
            .ensure_project(&cluster(), &identity(), &CancellationToken::new())
            .await
            .unwrap();
        stop.cancel();

        assert!(result.created);
        assert!(result.project_ready);
        assert!(result.namespaces_linked);
        assert!(result.project.metadata.name.starts_with(PROJECT_NAME_PREFIX));
        assert_eq!(result.project.tenant_id(), Some("t-1"));
        assert_eq!(result.project.quota_limit(), Some(&small_quota()));
        assert_eq!(result.project.namespace_default_limit(), Some(&small_quota()));
    }

    #[tokio::test(start_paused = true)]
    async fn existing_project_is_reused() {
        let f = fixture(small_quota()).await;
        let first = f
            .provisioner
            .ensure_project(&cluster(), &identity(), &CancellationToken::new())
            .await
            .unwrap();
        let second = f
            .provisioner
            .ensure_project(&cluster(), &identity(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.project.id(), second.project.id());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_logins_create_one_project() {
        let f = fixture(small_quota()).await;
        let (cluster, identity) = (cluster(), identity());
        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(
            f.provisioner.ensure_project(&cluster, &identity, &cancel),
            f.provisioner.ensure_project(&cluster, &identity, &cancel),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.project.id(), b.project.id());
        assert!(a.created ^ b.created);

        let projects = f
            .registries
            .projects
            .list(Some("c1"), &LabelSelector::everything())
            .await
            .unwrap();
        assert_eq!(projects.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_exceeded_creates_nothing() {
        let f = fixture(
            ResourceLimitSet::new()
                .with(ResourceKey::LimitsCpu, "6")
                .with(ResourceKey::LimitsMemory, "4Gi"),
        )
        .await;
        f.registries
            .projects
            .create(Project::new("c1", "existing", "other").with_quota(
                ResourceLimitSet::new().with(ResourceKey::LimitsCpu, "4"),
                ResourceLimitSet::new().with(ResourceKey::LimitsCpu, "1"),
            ))
            .await
            .unwrap();

        let err = f
            .provisioner
            .ensure_project(&cluster(), &identity(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(err.to_string(), "limitsCpu=10");

        let projects = f
            .registries
            .projects
            .list(Some("c1"), &LabelSelector::everything())
            .await
            .unwrap();
        assert_eq!(projects.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_timeout_is_not_fatal() {
        let f = fixture(small_quota()).await;
        let start = tokio::time::Instant::now();
        let result = f
            .provisioner
            .ensure_project(&cluster(), &identity(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.created);
        assert!(!result.project_ready);
        // no tenant namespaces yet, so nothing to link
        assert!(result.namespaces_linked);
        assert_eq!(
            start.elapsed(),
            Duration::from_millis(PROJECT_READY_TIMEOUT_MS)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tenant_namespaces_are_assigned() {
        let f = fixture(small_quota()).await;
        let mut ns = Namespace::new("c1", "acme-dev");
        ns.metadata
            .labels
            .insert(TENANT_NAMESPACE_LABEL.to_string(), "t-1".to_string());
        f.registries.namespaces.create(ns).await.unwrap();
        let stop = start_controller(&f.registries);

        let result = f
            .provisioner
            .ensure_project(&cluster(), &identity(), &CancellationToken::new())
            .await
            .unwrap();
        stop.cancel();

        assert!(result.namespaces_linked);
        let ns = f.registries.namespaces.get("c1", "acme-dev").await.unwrap();
        assert!(ns.is_linked_to(&result.project));
    }

    #[tokio::test(start_paused = true)]
    async fn namespace_store_error_is_reported_not_fatal() {
        let f = fixture(small_quota()).await;
        let key = Registry::<Namespace>::key("c1", "broken");
        f.registries
            .namespaces
            .store()
            .read_modify_write(&key, |_| {
                Ok::<_, anyhow::Error>((WriteOp::Put(b"not json".to_vec()), ()))
            })
            .await
            .unwrap();

        let result = f
            .provisioner
            .ensure_project(&cluster(), &identity(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.created);
        assert!(!result.namespaces_linked);
        assert_eq!(result.project.tenant_id(), Some("t-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_wait_is_an_error() {
        let f = fixture(small_quota()).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            trigger.cancel();
        });
        let err = f
            .provisioner
            .ensure_project(&cluster(), &identity(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Cancelled(_)));
    }

    #[test]
    fn settings_follow_config_file() {
        let config: ServerConfigFile = serde_yaml::from_str(
            "provisioning:\n  poll-interval-ms: 100\n  lock-ttl-secs: 60\n",
        )
        .unwrap();
        let settings = ProvisioningSettings::from_config(&config);
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
        assert_eq!(settings.lock_ttl, Duration::from_secs(60));
        assert_eq!(
            settings.project_ready_timeout,
            Duration::from_millis(PROJECT_READY_TIMEOUT_MS)
        );
        assert_eq!(settings.tenant_quota, default_tenant_quota());
    }

    #[test]
    fn project_names_are_stable() {
        let a = project_name("c1", &identity());
        assert_eq!(a, project_name("c1", &identity()));
        assert_ne!(a, project_name("c2", &identity()));
        assert_eq!(a.len(), PROJECT_NAME_PREFIX.len() + 10);
    }
}
