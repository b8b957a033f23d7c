use pkg_constants::labels::{
    PROJECT_ID_ANNOTATION, PROJECT_ID_LABEL, RESOURCE_QUOTA_ANNOTATION, TENANT_NAMESPACE_LABEL,
};
use pkg_constants::state::KIND_NAMESPACES;
use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, impl_resource};
use crate::project::Project;

/// A namespace inside a downstream cluster. Scoped by cluster name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub metadata: ObjectMeta,
}

impl_resource!(Namespace, KIND_NAMESPACES);

impl Namespace {
    pub fn new(cluster_name: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::named(name).in_scope(cluster_name),
        }
    }

    /// `<cluster>:<project>` this namespace was assigned to.
    pub fn project_id(&self) -> Option<&str> {
        self.metadata.annotation(PROJECT_ID_ANNOTATION)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.metadata.label(TENANT_NAMESPACE_LABEL)
    }

    pub fn quota_annotation(&self) -> Option<&str> {
        self.metadata.annotation(RESOURCE_QUOTA_ANNOTATION)
    }

    /// True once the project controller has confirmed the assignment.
    pub fn is_linked_to(&self, project: &Project) -> bool {
        self.metadata.label(PROJECT_ID_LABEL) == Some(project.metadata.name.as_str())
            && self.project_id() == Some(project.id().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_requires_annotation_and_label() {
        let project = Project::new("c1", "p1", "tenant");
        let mut ns = Namespace::new("c1", "team-ns");
        assert!(!ns.is_linked_to(&project));

        ns.metadata
            .annotations
            .insert(PROJECT_ID_ANNOTATION.to_string(), "c1:p1".to_string());
        assert_eq!(ns.project_id(), Some("c1:p1"));
        assert!(!ns.is_linked_to(&project));

        ns.metadata
            .labels
            .insert(PROJECT_ID_LABEL.to_string(), "p1".to_string());
        assert!(ns.is_linked_to(&project));
    }
}
