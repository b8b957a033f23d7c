use anyhow::{Result, bail};
use pkg_constants::state::{
    KIND_CLUSTER_ROLE_BINDINGS, KIND_GLOBAL_ROLE_BINDINGS, KIND_PROJECT_ROLE_BINDINGS,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::meta::{ObjectMeta, Resource, impl_resource};

// --- Entitlement actions ---

/// Entitlement tokens asserted by the identity provider per cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TenantAdmin,
    TenantMember,
    ClusterAdmin,
    QuotaManager,
    NetworkPolicyManager,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::TenantAdmin,
        Action::TenantMember,
        Action::ClusterAdmin,
        Action::QuotaManager,
        Action::NetworkPolicyManager,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Action::TenantAdmin => "tenant_admin",
            Action::TenantMember => "tenant_member",
            Action::ClusterAdmin => "cluster_admin",
            Action::QuotaManager => "quota_manager",
            Action::NetworkPolicyManager => "network_policy_manager",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.token() == token)
    }

    pub fn role(self) -> Role {
        ACTION_ROLES
            .iter()
            .find(|(action, _)| *action == self)
            .map(|(_, role)| *role)
            .unwrap_or(Role::ProjectMember)
    }
}

// --- Roles ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    ProjectOwner,
    ProjectMember,
    ClusterOwner,
    QuotaManager,
    NetworkPolicyManager,
}

/// Where a role's bindings live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleScope {
    Project,
    Cluster,
    Global,
}

impl fmt::Display for RoleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleScope::Project => write!(f, "project"),
            RoleScope::Cluster => write!(f, "cluster"),
            RoleScope::Global => write!(f, "global"),
        }
    }
}

static ACTION_ROLES: [(Action, Role); 5] = [
    (Action::TenantAdmin, Role::ProjectOwner),
    (Action::TenantMember, Role::ProjectMember),
    (Action::ClusterAdmin, Role::ClusterOwner),
    (Action::QuotaManager, Role::QuotaManager),
    (Action::NetworkPolicyManager, Role::NetworkPolicyManager),
];

static ROLE_SCOPES: [(Role, RoleScope); 5] = [
    (Role::ProjectOwner, RoleScope::Project),
    (Role::ProjectMember, RoleScope::Project),
    (Role::ClusterOwner, RoleScope::Cluster),
    (Role::QuotaManager, RoleScope::Global),
    (Role::NetworkPolicyManager, RoleScope::Global),
];

impl Role {
    pub const ALL: [Role; 5] = [
        Role::ProjectOwner,
        Role::ProjectMember,
        Role::ClusterOwner,
        Role::QuotaManager,
        Role::NetworkPolicyManager,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::ProjectOwner => "project-owner",
            Role::ProjectMember => "project-member",
            Role::ClusterOwner => "cluster-owner",
            Role::QuotaManager => "quota-manager",
            Role::NetworkPolicyManager => "network-policy-manager",
        }
    }

    pub fn scope(self) -> RoleScope {
        ROLE_SCOPES
            .iter()
            .find(|(role, _)| *role == self)
            .map(|(_, scope)| *scope)
            .unwrap_or(RoleScope::Project)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Verify the action and scope tables cover every variant exactly once.
/// Run once at startup.
pub fn check_role_tables() -> Result<()> {
    for action in Action::ALL {
        let rows = ACTION_ROLES.iter().filter(|(a, _)| *a == action).count();
        if rows != 1 {
            bail!("action '{}' has {} role mappings, expected 1", action.token(), rows);
        }
    }
    for role in Role::ALL {
        let rows = ROLE_SCOPES.iter().filter(|(r, _)| *r == role).count();
        if rows != 1 {
            bail!("role '{}' has {} scope entries, expected 1", role, rows);
        }
        if !ACTION_ROLES.iter().any(|(_, r)| *r == role) {
            bail!("role '{}' is not granted by any action", role);
        }
    }
    Ok(())
}

/// Roles granted by `actions` that live in `scope`. Unknown tokens are ignored.
pub fn roles_for_scope<S: AsRef<str>>(actions: &[S], scope: RoleScope) -> BTreeSet<Role> {
    actions
        .iter()
        .filter_map(|token| Action::parse(token.as_ref()))
        .map(Action::role)
        .filter(|role| role.scope() == scope)
        .collect()
}

// --- Bindings ---

/// Implemented by every binding kind the reconciler converges.
pub trait RoleBindingObject: Resource {
    fn role(&self) -> Role;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRoleBinding {
    pub metadata: ObjectMeta,
    /// `<cluster>:<project>`.
    pub project_name: String,
    pub role: Role,
    pub user_principal_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRoleBinding {
    pub metadata: ObjectMeta,
    pub cluster_name: String,
    pub role: Role,
    pub user_principal_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalRoleBinding {
    pub metadata: ObjectMeta,
    pub role: Role,
    /// Local user the binding grants to.
    #[serde(default)]
    pub user_name: String,
}

impl_resource!(ProjectRoleBinding, KIND_PROJECT_ROLE_BINDINGS);
impl_resource!(ClusterRoleBinding, KIND_CLUSTER_ROLE_BINDINGS);
impl_resource!(GlobalRoleBinding, KIND_GLOBAL_ROLE_BINDINGS);

impl RoleBindingObject for ProjectRoleBinding {
    fn role(&self) -> Role {
        self.role
    }
}

impl RoleBindingObject for ClusterRoleBinding {
    fn role(&self) -> Role {
        self.role
    }
}

impl RoleBindingObject for GlobalRoleBinding {
    fn role(&self) -> Role {
        self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_complete() {
        check_role_tables().unwrap();
    }

    #[test]
    fn actions_map_to_roles_and_scopes() {
        assert_eq!(Action::parse("tenant_admin").map(Action::role), Some(Role::ProjectOwner));
        assert_eq!(Action::parse("tenant_member").map(Action::role), Some(Role::ProjectMember));
        assert_eq!(Action::parse("cluster_admin").map(Action::role), Some(Role::ClusterOwner));
        assert_eq!(Role::ClusterOwner.scope(), RoleScope::Cluster);
        assert_eq!(Role::QuotaManager.scope(), RoleScope::Global);
        assert_eq!(Role::NetworkPolicyManager.scope(), RoleScope::Global);
        assert_eq!(Action::parse("root"), None);
    }

    #[test]
    fn roles_for_scope_filters_and_ignores_unknown() {
        let actions = ["tenant_admin", "cluster_admin", "quota_manager", "bogus", "tenant_admin"];
        assert_eq!(
            roles_for_scope(&actions, RoleScope::Project),
            BTreeSet::from([Role::ProjectOwner])
        );
        assert_eq!(
            roles_for_scope(&actions, RoleScope::Cluster),
            BTreeSet::from([Role::ClusterOwner])
        );
        assert_eq!(
            roles_for_scope(&actions, RoleScope::Global),
            BTreeSet::from([Role::QuotaManager])
        );
    }

    #[test]
    fn role_serializes_by_name() {
        assert_eq!(
            serde_json::to_string(&Role::NetworkPolicyManager).unwrap(),
            r#""network-policy-manager""#
        );
        for role in Role::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.name()));
        }
    }
}
