//! Persisted object types, label selectors, role tables and config files.

pub mod cluster;
pub mod config;
pub mod identity;
pub mod meta;
pub mod namespace;
pub mod project;
pub mod rbac;
pub mod selector;
pub mod validate;

pub use cluster::Cluster;
pub use identity::IdentityAssertion;
pub use meta::{Condition, ObjectMeta, Resource};
pub use namespace::Namespace;
pub use project::Project;
pub use rbac::{ClusterRoleBinding, GlobalRoleBinding, ProjectRoleBinding, Role, RoleScope};
pub use selector::LabelSelector;
