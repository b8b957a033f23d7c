//! Label and annotation keys written on persisted objects.

// ─── Clusters ─────────────────────────────────────────────────────────────

/// Cluster label carrying the identity provider's region/cluster key.
pub const CLUSTER_KEY_LABEL: &str = "tenancy.io/cluster-key";

/// Cluster label holding the cpu overcommit multiplier.
pub const CPU_OVERCOMMIT_LABEL: &str = "quota.tenancy.io/cpu-overcommit";

/// Cluster label holding the memory overcommit multiplier.
pub const MEMORY_OVERCOMMIT_LABEL: &str = "quota.tenancy.io/memory-overcommit";

// ─── Projects / namespaces ────────────────────────────────────────────────

/// Project label carrying the tenant id that owns the project.
pub const TENANT_ID_LABEL: &str = "tenancy.io/tenant-id";

/// Project label marking the cluster's system project.
pub const SYSTEM_PROJECT_LABEL: &str = "tenancy.io/system-project";

/// Namespace label carrying the tenant id of the namespace's owner.
pub const TENANT_NAMESPACE_LABEL: &str = "tenancy.io/tenant-namespace";

/// Namespace annotation linking it to `<cluster>:<project>`.
/// The background controller mirrors it as a label holding the project name.
pub const PROJECT_ID_ANNOTATION: &str = "tenancy.io/project-id";

/// Namespace label naming the project it belongs to, set once the link is established.
pub const PROJECT_ID_LABEL: &str = "tenancy.io/project";

/// Project condition set once the project's backing namespace exists.
pub const NAMESPACE_BACKED_CONDITION: &str = "NamespaceBacked";

/// Annotation storing a JSON-encoded resource limit set.
pub const RESOURCE_QUOTA_ANNOTATION: &str = "tenancy.io/resource-quota";

/// Annotation naming the tenant that created the object.
pub const CREATOR_ID_ANNOTATION: &str = "tenancy.io/creator-id";

// ─── Role bindings ────────────────────────────────────────────────────────

/// Correlation label: the external principal id owning a binding.
pub const PRINCIPAL_LABEL: &str = "authz.tenancy.io/principal";

/// Correlation label: the tenant short name owning a global binding.
pub const TENANT_SHORT_NAME_LABEL: &str = "authz.tenancy.io/tenant";

/// Marker on cluster bindings that mirror a global role.
pub const GLOBAL_BINDING_LABEL: &str = "authz.tenancy.io/global-binding";

/// Annotation holding the principal's human-readable name.
pub const PRINCIPAL_DISPLAY_NAME_ANNOTATION: &str = "authz.tenancy.io/principal-display-name";

/// Scheme prefix of user principal names written on bindings.
pub const USER_PRINCIPAL_PREFIX: &str = "sso_user://";
