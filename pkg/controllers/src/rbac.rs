use pkg_constants::labels::{
    GLOBAL_BINDING_LABEL, PRINCIPAL_DISPLAY_NAME_ANNOTATION, PRINCIPAL_LABEL,
    TENANT_SHORT_NAME_LABEL,
};
use pkg_state::{Lister, Listers, Registries, Registry};
use pkg_types::meta::{ObjectMeta, Resource};
use pkg_types::rbac::{RoleBindingObject, roles_for_scope};
use pkg_types::{
    Cluster, ClusterRoleBinding, GlobalRoleBinding, IdentityAssertion, LabelSelector, Project,
    ProjectRoleBinding, Role, RoleScope,
};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ReconcileWriteError;

/// Counts and failures of one or more reconcile passes.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: usize,
    pub deleted: usize,
    pub updated: usize,
    pub errors: Vec<ReconcileWriteError>,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: ReconcileReport) {
        self.created += other.created;
        self.deleted += other.deleted;
        self.updated += other.updated;
        self.errors.extend(other.errors);
    }

    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.deleted == 0 && self.updated == 0 && self.errors.is_empty()
    }
}

/// Converges the role bindings owned by one principal towards the roles its
/// entitlement actions grant.
///
/// Existing bindings are found through the correlation label, read from the
/// listers. Deletions run before creations. A binding that is already gone
/// or already exists is not an error, and a failing role does not stop the
/// others.
#[derive(Clone)]
pub struct RoleBindingReconciler {
    registries: Registries,
    listers: Listers,
}

impl RoleBindingReconciler {
    pub fn new(registries: Registries, listers: Listers) -> Self {
        Self {
            registries,
            listers,
        }
    }

    pub async fn reconcile_project<S: AsRef<str>>(
        &self,
        identity: &IdentityAssertion,
        project: &Project,
        actions: &[S],
    ) -> ReconcileReport {
        let desired = roles_for_scope(actions, RoleScope::Project);
        let project_id = project.id();
        let selector =
            LabelSelector::everything().with_label(PRINCIPAL_LABEL, identity.principal_id.as_str());

        let report = converge(
            &self.registries.project_bindings,
            &self.listers.project_bindings,
            Some(&project_id),
            &selector,
            RoleScope::Project,
            &desired,
            |role| ProjectRoleBinding {
                metadata: binding_meta(identity, role, &project_id).in_scope(project_id.as_str()),
                project_name: project_id.clone(),
                role,
                user_principal_name: identity.user_principal_name(),
            },
        )
        .await;
        log_scope_errors(&report, RoleScope::Project, &project_id);
        report
    }

    /// Cluster-scoped roles only. Bindings that mirror global roles carry the
    /// global marker and are left alone here.
    pub async fn reconcile_cluster<S: AsRef<str>>(
        &self,
        identity: &IdentityAssertion,
        cluster: &Cluster,
        actions: &[S],
    ) -> ReconcileReport {
        let desired = roles_for_scope(actions, RoleScope::Cluster);
        let cluster_name = cluster.metadata.name.as_str();
        let selector = LabelSelector::everything()
            .with_label(PRINCIPAL_LABEL, identity.principal_id.as_str())
            .without_label(GLOBAL_BINDING_LABEL);

        let report = converge(
            &self.registries.cluster_bindings,
            &self.listers.cluster_bindings,
            Some(cluster_name),
            &selector,
            RoleScope::Cluster,
            &desired,
            |role| ClusterRoleBinding {
                metadata: binding_meta(identity, role, cluster_name).in_scope(cluster_name),
                cluster_name: cluster_name.to_string(),
                role,
                user_principal_name: identity.user_principal_name(),
            },
        )
        .await;
        log_scope_errors(&report, RoleScope::Cluster, cluster_name);
        report
    }

    /// Global roles: one global binding per role granted on any cluster, plus
    /// a marked cluster binding per cluster that grants it.
    pub async fn reconcile_global(
        &self,
        identity: &IdentityAssertion,
        clusters: &[(Cluster, Vec<String>)],
    ) -> ReconcileReport {
        let desired: BTreeSet<Role> = clusters
            .iter()
            .flat_map(|(_, actions)| roles_for_scope(actions, RoleScope::Global))
            .collect();
        info!(
            "ensure global roles {:?} for principal {}, tenant {}",
            desired, identity.principal_id, identity.tenant_short_name
        );

        let owner = LabelSelector::everything()
            .with_label(PRINCIPAL_LABEL, identity.principal_id.as_str())
            .with_label(TENANT_SHORT_NAME_LABEL, identity.tenant_short_name.as_str());
        let user_name = identity.display_name().to_string();

        let mut report = converge(
            &self.registries.global_bindings,
            &self.listers.global_bindings,
            None,
            &owner,
            RoleScope::Global,
            &desired,
            |role| GlobalRoleBinding {
                metadata: binding_meta(identity, role, &tenant_scoped(identity, "global"))
                    .with_label(TENANT_SHORT_NAME_LABEL, identity.tenant_short_name.as_str()),
                role,
                user_name: user_name.clone(),
            },
        )
        .await;
        report.merge(self.sync_global_user(identity, &owner).await);
        log_scope_errors(&report, RoleScope::Global, "global");

        let mirror = owner.clone().with_label(GLOBAL_BINDING_LABEL, "true");
        for (cluster, actions) in clusters {
            let cluster_name = cluster.metadata.name.as_str();
            let cluster_desired = roles_for_scope(actions, RoleScope::Global);
            let mirrored = converge(
                &self.registries.cluster_bindings,
                &self.listers.cluster_bindings,
                Some(cluster_name),
                &mirror,
                RoleScope::Global,
                &cluster_desired,
                |role| ClusterRoleBinding {
                    metadata: binding_meta(identity, role, &tenant_scoped(identity, cluster_name))
                        .in_scope(cluster_name)
                        .with_label(TENANT_SHORT_NAME_LABEL, identity.tenant_short_name.as_str())
                        .with_label(GLOBAL_BINDING_LABEL, "true"),
                    cluster_name: cluster_name.to_string(),
                    role,
                    user_principal_name: identity.user_principal_name(),
                },
            )
            .await;
            log_scope_errors(&mirrored, RoleScope::Global, cluster_name);
            report.merge(mirrored);
        }
        report
    }

    /// Point the principal's global bindings at its current user name.
    async fn sync_global_user(
        &self,
        identity: &IdentityAssertion,
        owner: &LabelSelector,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let user_name = identity.display_name();
        for mut binding in self.listers.global_bindings.list(None, owner).await {
            if binding.user_name == user_name {
                continue;
            }
            debug!(
                "global binding {} user {:?} -> {:?}",
                binding.metadata.name, binding.user_name, user_name
            );
            let role = binding.role;
            binding.user_name = user_name.to_string();
            match self.registries.global_bindings.update(binding).await {
                Ok(_) => report.updated += 1,
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    debug!("global binding changed underneath user sync: {}", e)
                }
                Err(source) => report.errors.push(ReconcileWriteError {
                    scope: RoleScope::Global,
                    role,
                    op: "update",
                    source,
                }),
            }
        }
        report
    }
}

/// Deterministic binding name for (principal, role, scope object), so
/// concurrent logins collide on create instead of duplicating.
fn binding_name(identity: &IdentityAssertion, role: Role, scope_object: &str) -> String {
    let seed = format!("{}/{}/{}", identity.principal_id, role.name(), scope_object);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
        .simple()
        .to_string();
    format!("{}-{}", role.name(), &id[..10])
}

/// Global bindings and their mirrors are owned per tenant, so one principal
/// in two tenants gets a binding for each.
fn tenant_scoped(identity: &IdentityAssertion, scope_object: &str) -> String {
    format!("{}/{}", scope_object, identity.tenant_short_name)
}

fn binding_meta(identity: &IdentityAssertion, role: Role, scope_object: &str) -> ObjectMeta {
    ObjectMeta::named(binding_name(identity, role, scope_object))
        .with_label(PRINCIPAL_LABEL, identity.principal_id.as_str())
        .with_annotation(PRINCIPAL_DISPLAY_NAME_ANNOTATION, identity.display_name())
}

async fn converge<B, F>(
    registry: &Registry<B>,
    lister: &Lister<B>,
    scope: Option<&str>,
    selector: &LabelSelector,
    role_scope: RoleScope,
    desired: &BTreeSet<Role>,
    make: F,
) -> ReconcileReport
where
    B: RoleBindingObject,
    F: Fn(Role) -> B,
{
    let mut report = ReconcileReport::default();
    let existing = lister.list(scope, selector).await;

    let mut kept = BTreeSet::new();
    let mut to_delete = Vec::new();
    for binding in &existing {
        // a second binding for a role already kept is a leftover from a race
        if desired.contains(&binding.role()) && kept.insert(binding.role()) {
            continue;
        }
        to_delete.push(binding);
    }
    let to_create: Vec<Role> = desired.difference(&kept).copied().collect();

    for binding in to_delete {
        debug!(
            "deleting {} binding {} for role {}",
            role_scope,
            binding.name(),
            binding.role()
        );
        match registry.delete_if_exists(binding.scope(), binding.name()).await {
            Ok(true) => report.deleted += 1,
            Ok(false) => debug!("binding {} already gone", binding.name()),
            Err(source) => report.errors.push(ReconcileWriteError {
                scope: role_scope,
                role: binding.role(),
                op: "delete",
                source,
            }),
        }
    }

    for role in to_create {
        debug!("creating {} binding for role {}", role_scope, role);
        match registry.create(make(role)).await {
            Ok(_) => report.created += 1,
            Err(e) if e.is_already_exists() => debug!("binding already exists: {}", e),
            Err(source) => report.errors.push(ReconcileWriteError {
                scope: role_scope,
                role,
                op: "create",
                source,
            }),
        }
    }
    report
}

fn log_scope_errors(report: &ReconcileReport, scope: RoleScope, target: &str) {
    for e in &report.errors {
        error!("{} role binding reconcile for {} failed: {}", scope, target, e);
    }
    if !report.errors.is_empty() {
        warn!(
            "{} scope for {} converged partially ({} errors)",
            scope,
            target,
            report.errors.len()
        );
    }
}
