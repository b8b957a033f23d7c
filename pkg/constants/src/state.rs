//! State store / registry constants.

/// Root prefix of every persisted object key.
pub const REGISTRY_PREFIX: &str = "/registry";

/// Registry kind segment for clusters.
pub const KIND_CLUSTERS: &str = "clusters";

/// Registry kind segment for projects (scoped by cluster name).
pub const KIND_PROJECTS: &str = "projects";

/// Registry kind segment for namespaces (scoped by cluster name).
pub const KIND_NAMESPACES: &str = "namespaces";

/// Registry kind segment for project role bindings (scoped by project name).
pub const KIND_PROJECT_ROLE_BINDINGS: &str = "projectrolebindings";

/// Registry kind segment for cluster role bindings (scoped by cluster name).
pub const KIND_CLUSTER_ROLE_BINDINGS: &str = "clusterrolebindings";

/// Registry kind segment for global role bindings (unscoped).
pub const KIND_GLOBAL_ROLE_BINDINGS: &str = "globalrolebindings";

/// Scope segment used for objects that have no owning scope.
pub const CLUSTER_WIDE_SCOPE: &str = "_";

/// Number of recent mutations kept by the in-memory event log.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// Length of the random suffix appended to `generate_name` prefixes.
pub const GENERATED_NAME_SUFFIX_LEN: usize = 5;
