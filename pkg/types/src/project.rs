use pkg_constants::labels::{NAMESPACE_BACKED_CONDITION, SYSTEM_PROJECT_LABEL, TENANT_ID_LABEL};
use pkg_constants::state::KIND_PROJECTS;
use pkg_quota::{ProjectClaim, ResourceLimitSet};
use serde::{Deserialize, Serialize};

use crate::meta::{Condition, ObjectMeta, Resource, impl_resource, is_condition_true};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectResourceQuota {
    #[serde(default)]
    pub limit: ResourceLimitSet,
    /// Sum of the quotas already handed out to the project's namespaces.
    #[serde(default)]
    pub used_limit: ResourceLimitSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceResourceQuota {
    #[serde(default)]
    pub limit: ResourceLimitSet,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub display_name: String,
    pub cluster_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resource_quota: Option<ProjectResourceQuota>,
    #[serde(default)]
    pub namespace_default_resource_quota: Option<NamespaceResourceQuota>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A group of namespaces inside one cluster, sharing a quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub metadata: ObjectMeta,
    pub spec: ProjectSpec,
    #[serde(default)]
    pub status: ProjectStatus,
}

impl_resource!(Project, KIND_PROJECTS);

impl Project {
    pub fn new(cluster_name: &str, name: &str, display_name: &str) -> Self {
        Self {
            metadata: ObjectMeta::named(name).in_scope(cluster_name),
            spec: ProjectSpec {
                display_name: display_name.to_string(),
                cluster_name: cluster_name.to_string(),
                ..Default::default()
            },
            status: ProjectStatus::default(),
        }
    }

    pub fn with_quota(mut self, limit: ResourceLimitSet, namespace_default: ResourceLimitSet) -> Self {
        self.spec.resource_quota = Some(ProjectResourceQuota {
            limit,
            used_limit: ResourceLimitSet::new(),
        });
        self.spec.namespace_default_resource_quota = Some(NamespaceResourceQuota {
            limit: namespace_default,
        });
        self
    }

    /// `<cluster>:<project>`, the id namespaces and bindings refer to.
    pub fn id(&self) -> String {
        project_id(self.scope(), self.name())
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.metadata.label(TENANT_ID_LABEL)
    }

    pub fn is_system(&self) -> bool {
        self.metadata.label(SYSTEM_PROJECT_LABEL) == Some("true")
    }

    pub fn is_namespace_backed(&self) -> bool {
        is_condition_true(&self.status.conditions, NAMESPACE_BACKED_CONDITION)
    }

    pub fn quota_limit(&self) -> Option<&ResourceLimitSet> {
        self.spec.resource_quota.as_ref().map(|q| &q.limit)
    }

    pub fn namespace_default_limit(&self) -> Option<&ResourceLimitSet> {
        self.spec
            .namespace_default_resource_quota
            .as_ref()
            .map(|q| &q.limit)
    }

    /// This project's share of its cluster, if it carries a quota.
    pub fn claim(&self) -> Option<ProjectClaim> {
        self.quota_limit()
            .map(|limit| ProjectClaim::new(self.id(), limit.clone()))
    }
}

pub fn project_id(cluster_name: &str, project_name: &str) -> String {
    format!("{}:{}", cluster_name, project_name)
}

/// Split `<cluster>:<project>`.
pub fn split_project_id(id: &str) -> Option<(&str, &str)> {
    match id.split_once(':') {
        Some((cluster, project)) if !cluster.is_empty() && !project.is_empty() => {
            Some((cluster, project))
        }
        _ => None,
    }
}
