use pkg_constants::labels::CLUSTER_KEY_LABEL;
use pkg_state::Listers;
use pkg_types::selector::SelectorOperator;
use pkg_types::validate::validate_label_value;
use pkg_types::{Cluster, IdentityAssertion, LabelSelector};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ProvisionError;
use crate::provision::TenantProvisioner;
use crate::rbac::{ReconcileReport, RoleBindingReconciler};

/// Why one cluster of a login failed. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LoginFailureStatus {
    InsufficientQuota = 1,
    OtherFailure = 2,
}

impl From<LoginFailureStatus> for u8 {
    fn from(status: LoginFailureStatus) -> u8 {
        status as u8
    }
}

impl TryFrom<u8> for LoginFailureStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(LoginFailureStatus::InsufficientQuota),
            2 => Ok(LoginFailureStatus::OtherFailure),
            other => Err(format!("unknown login failure status {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantLoginFailure {
    pub id: String,
    pub name: String,
    pub cluster_key: String,
    pub status: LoginFailureStatus,
    pub message: String,
}

/// Some clusters of a login failed. Carries the clusters that did not, so
/// callers can still grant access to them.
#[derive(Debug)]
pub struct PartialLoginFailure {
    pub failures: Vec<TenantLoginFailure>,
    pub summary: LoginSummary,
}

impl PartialLoginFailure {
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.failures).unwrap_or_else(|_| "[]".to_string())
    }
}

impl fmt::Display for PartialLoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

impl std::error::Error for PartialLoginFailure {}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error(transparent)]
    Partial(#[from] PartialLoginFailure),
}

#[derive(Debug, Default)]
pub struct LoginSummary {
    /// Names of the clusters the tenant now has a project on.
    pub succeeded: Vec<String>,
    pub projects_created: usize,
    pub report: ReconcileReport,
}

/// Runs a tenant login across every cluster the identity is entitled to.
#[derive(Clone)]
pub struct LoginOrchestrator {
    listers: Listers,
    provisioner: TenantProvisioner,
    reconciler: RoleBindingReconciler,
}

impl LoginOrchestrator {
    pub fn new(
        listers: Listers,
        provisioner: TenantProvisioner,
        reconciler: RoleBindingReconciler,
    ) -> Self {
        Self {
            listers,
            provisioner,
            reconciler,
        }
    }

    /// Clusters are handled one after another; a failing cluster is recorded
    /// and the rest still run. Global roles are reconciled once, after the
    /// per-cluster passes.
    pub async fn login(
        &self,
        identity: &IdentityAssertion,
        cancel: &CancellationToken,
    ) -> Result<LoginSummary, LoginError> {
        validate_identity(identity)?;

        let keys: Vec<String> = identity
            .entitled_cluster_keys()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut summary = LoginSummary::default();
        if keys.is_empty() {
            info!(
                "principal {} of tenant {} has no cluster entitlements",
                identity.principal_id, identity.tenant_short_name
            );
            return Ok(summary);
        }

        let selector =
            LabelSelector::everything().with_requirement(CLUSTER_KEY_LABEL, SelectorOperator::In, keys);
        let clusters = self.listers.clusters.list(None, &selector).await;
        info!(
            "login for principal {} of tenant {} on {} clusters",
            identity.principal_id,
            identity.tenant_short_name,
            clusters.len()
        );

        let mut failures = Vec::new();
        let mut entitled: Vec<(Cluster, Vec<String>)> = Vec::new();
        for cluster in clusters {
            let Some(cluster_key) = cluster.cluster_key().map(str::to_string) else {
                continue;
            };
            let actions = identity.actions_for(&cluster_key).to_vec();

            if cancel.is_cancelled() {
                failures.push(failure(
                    &cluster,
                    &cluster_key,
                    LoginFailureStatus::OtherFailure,
                    "login cancelled".to_string(),
                ));
                continue;
            }

            debug!(
                "login on cluster {} ({}) with actions {:?}",
                cluster.metadata.name, cluster_key, actions
            );
            match self.provisioner.ensure_project(&cluster, identity, cancel).await {
                Ok(provisioned) => {
                    if provisioned.created {
                        summary.projects_created += 1;
                    }
                    let project_report = self
                        .reconciler
                        .reconcile_project(identity, &provisioned.project, &actions)
                        .await;
                    let cluster_report = self
                        .reconciler
                        .reconcile_cluster(identity, &cluster, &actions)
                        .await;
                    summary.report.merge(project_report);
                    summary.report.merge(cluster_report);
                    summary.succeeded.push(cluster.metadata.name.clone());
                }
                Err(e) => {
                    error!(
                        "login for tenant {} failed on cluster {}: {}",
                        identity.tenant_short_name, cluster.metadata.name, e
                    );
                    failures.push(failure(&cluster, &cluster_key, status_of(&e), e.to_string()));
                }
            }
            entitled.push((cluster, actions));
        }

        if cancel.is_cancelled() {
            warn!(
                "login for principal {} cancelled, global roles left untouched",
                identity.principal_id
            );
        } else {
            let global = self.reconciler.reconcile_global(identity, &entitled).await;
            summary.report.merge(global);
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(PartialLoginFailure { failures, summary }.into())
        }
    }
}

fn validate_identity(identity: &IdentityAssertion) -> Result<(), LoginError> {
    for (field, value) in [
        ("principal id", identity.principal_id.as_str()),
        ("tenant id", identity.tenant_id.as_str()),
        ("tenant short name", identity.tenant_short_name.as_str()),
    ] {
        if value.is_empty() {
            return Err(LoginError::InvalidIdentity(format!("{} is required", field)));
        }
        validate_label_value(value)
            .map_err(|e| LoginError::InvalidIdentity(format!("{}: {}", field, e)))?;
    }
    Ok(())
}

fn status_of(e: &ProvisionError) -> LoginFailureStatus {
    if e.is_quota_exceeded() {
        LoginFailureStatus::InsufficientQuota
    } else {
        LoginFailureStatus::OtherFailure
    }
}

fn failure(
    cluster: &Cluster,
    cluster_key: &str,
    status: LoginFailureStatus,
    message: String,
) -> TenantLoginFailure {
    TenantLoginFailure {
        id: cluster.metadata.name.clone(),
        name: cluster.display_name().to_string(),
        cluster_key: cluster_key.to_string(),
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::ProvisioningSettings;
    use pkg_quota::{ResourceKey, ResourceLimitSet};
    use pkg_state::{ProjectLockRegistry, Registries, StateStore};
    use pkg_types::{Project, Role};
    use std::collections::BTreeMap;

    async fn orchestrator(registries: &Registries, store: &StateStore) -> LoginOrchestrator {
        let listers = Listers::start(store).await.unwrap();
        let settings = ProvisioningSettings {
            tenant_quota: ResourceLimitSet::new().with(ResourceKey::LimitsCpu, "4"),
            ..Default::default()
        };
        let provisioner = TenantProvisioner::new(
            registries.clone(),
            listers.clone(),
            ProjectLockRegistry::new(settings.lock_ttl),
            settings,
        );
        let reconciler = RoleBindingReconciler::new(registries.clone(), listers.clone());
        LoginOrchestrator::new(listers, provisioner, reconciler)
    }

    fn identity(clusters: &[(&str, &[&str])]) -> IdentityAssertion {
        IdentityAssertion {
            tenant_id: "t-1".into(),
            tenant_short_name: "acme".into(),
            principal_id: "u-1".into(),
            username: Some("alice".into()),
            cluster_actions: clusters
                .iter()
                .map(|(key, actions)| {
                    (key.to_string(), actions.iter().map(|a| a.to_string()).collect())
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_cluster_short_on_quota_does_not_stop_the_rest() {
        let store = StateStore::in_memory();
        let registries = Registries::new(&store);
        for (name, key, cpu) in [("a", "key-a", "6"), ("b", "key-b", "16"), ("c", "key-c", "16")] {
            registries
                .clusters
                .create(Cluster::new(name, key).with_allocatable("cpu", cpu))
                .await
                .unwrap();
        }
        // leaves 2 cpu on cluster a, the tenant default asks for 4
        registries
            .projects
            .create(Project::new("a", "busy", "other").with_quota(
                ResourceLimitSet::new().with(ResourceKey::LimitsCpu, "4"),
                ResourceLimitSet::new().with(ResourceKey::LimitsCpu, "1"),
            ))
            .await
            .unwrap();
        let login = orchestrator(&registries, &store).await;
        let user = identity(&[
            ("key-a", &["tenant_admin", "cluster_admin"]),
            ("key-b", &["tenant_admin", "cluster_admin"]),
            ("key-c", &["tenant_member", "quota_manager"]),
        ]);

        let err = login.login(&user, &CancellationToken::new()).await.unwrap_err();
        let LoginError::Partial(partial) = err else {
            panic!("expected a partial failure");
        };
        assert_eq!(partial.failures.len(), 1);
        let failed = &partial.failures[0];
        assert_eq!(failed.id, "a");
        assert_eq!(failed.cluster_key, "key-a");
        assert_eq!(failed.status, LoginFailureStatus::InsufficientQuota);
        assert_eq!(failed.message, "limitsCpu=8");
        assert_eq!(partial.summary.succeeded, vec!["b", "c"]);
        assert_eq!(partial.summary.projects_created, 2);

        let json: serde_json::Value = serde_json::from_str(&partial.to_string()).unwrap();
        assert_eq!(json[0]["status"], 1);
        assert_eq!(json[0]["clusterKey"], "key-a");

        let everything = LabelSelector::everything();
        let b_owner = registries
            .cluster_bindings
            .list(Some("b"), &everything)
            .await
            .unwrap();
        assert_eq!(b_owner.len(), 1);
        assert_eq!(b_owner[0].role, Role::ClusterOwner);
        assert!(registries
            .cluster_bindings
            .list(Some("a"), &everything)
            .await
            .unwrap()
            .is_empty());
        let project_bindings = registries
            .project_bindings
            .list(None, &everything)
            .await
            .unwrap();
        assert_eq!(project_bindings.len(), 2);
        let global = registries
            .global_bindings
            .list(None, &everything)
            .await
            .unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].role, Role::QuotaManager);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_login_is_a_noop() {
        let store = StateStore::in_memory();
        let registries = Registries::new(&store);
        registries
            .clusters
            .create(Cluster::new("b", "key-b").with_allocatable("cpu", "16"))
            .await
            .unwrap();
        let login = orchestrator(&registries, &store).await;
        let user = identity(&[("key-b", &["tenant_admin", "cluster_admin", "quota_manager"])]);

        let first = login.login(&user, &CancellationToken::new()).await.unwrap();
        assert_eq!(first.projects_created, 1);
        assert_eq!(first.report.created, 4);

        let second = login.login(&user, &CancellationToken::new()).await.unwrap();
        assert_eq!(second.projects_created, 0);
        assert!(second.report.is_noop(), "{:?}", second.report);
    }

    #[tokio::test]
    async fn clusters_without_actions_or_unknown_keys_are_skipped() {
        let store = StateStore::in_memory();
        let registries = Registries::new(&store);
        let login = orchestrator(&registries, &store).await;
        let user = identity(&[("key-x", &[]), ("key-y", &["tenant_admin"])]);
        let summary = login.login(&user, &CancellationToken::new()).await.unwrap();
        assert!(summary.succeeded.is_empty());
        assert!(summary.report.is_noop());
    }

    #[tokio::test]
    async fn invalid_principal_is_rejected_before_any_write() {
        let store = StateStore::in_memory();
        let registries = Registries::new(&store);
        let login = orchestrator(&registries, &store).await;
        let mut user = identity(&[("key-b", &["tenant_admin"])]);
        user.principal_id = "bad principal!".into();
        assert!(matches!(
            login.login(&user, &CancellationToken::new()).await,
            Err(LoginError::InvalidIdentity(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_login_reports_remaining_clusters() {
        let store = StateStore::in_memory();
        let registries = Registries::new(&store);
        for (name, key) in [("a", "key-a"), ("b", "key-b")] {
            registries
                .clusters
                .create(Cluster::new(name, key).with_allocatable("cpu", "16"))
                .await
                .unwrap();
        }
        let login = orchestrator(&registries, &store).await;
        let user = identity(&[("key-a", &["tenant_admin"]), ("key-b", &["tenant_admin"])]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let LoginError::Partial(partial) = login.login(&user, &cancel).await.unwrap_err() else {
            panic!("expected a partial failure");
        };
        assert_eq!(partial.failures.len(), 2);
        assert!(partial
            .failures
            .iter()
            .all(|f| f.status == LoginFailureStatus::OtherFailure));
        assert!(registries
            .projects
            .list(None, &LabelSelector::everything())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn failure_status_round_trips_as_number() {
        let failure = TenantLoginFailure {
            id: "c1".into(),
            name: "east".into(),
            cluster_key: "key".into(),
            status: LoginFailureStatus::OtherFailure,
            message: "boom".into(),
        };
        let json = serde_json::to_string(&failure).unwrap();
        assert_eq!(
            json,
            r#"{"id":"c1","name":"east","clusterKey":"key","status":2,"message":"boom"}"#
        );
        let back: TenantLoginFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failure);
        assert!(serde_json::from_str::<TenantLoginFailure>(
            r#"{"id":"c1","name":"east","clusterKey":"key","status":7,"message":""}"#
        )
        .is_err());
    }
}
