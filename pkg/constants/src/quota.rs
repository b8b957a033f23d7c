//! Quota, locking and provisioning timing constants.

/// How long an unused project lock stays in the registry, in seconds.
pub const PROJECT_LOCK_TTL_SECS: u64 = 3600;

/// Interval between readiness polls, in milliseconds.
pub const READY_POLL_INTERVAL_MS: u64 = 500;

/// Upper bound on waiting for a project to become namespace-backed, in milliseconds.
pub const PROJECT_READY_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on waiting for a tenant namespace to link to its project, in milliseconds.
pub const NAMESPACE_READY_TIMEOUT_MS: u64 = 10_000;

/// Prefix for generated project names.
pub const PROJECT_NAME_PREFIX: &str = "pro-";

/// Default tenant project cpu quota (requests and limits).
pub const DEFAULT_TENANT_CPU: &str = "100";

/// Default tenant project memory quota (requests and limits).
pub const DEFAULT_TENANT_MEMORY: &str = "100Gi";

/// Default tenant project storage request quota.
pub const DEFAULT_TENANT_STORAGE: &str = "500Gi";

/// Default tenant object-count quota (services, secrets, configmaps, ...).
pub const DEFAULT_TENANT_OBJECT_COUNT: &str = "100";

/// Default tenant node-port / load-balancer quota.
pub const DEFAULT_TENANT_PORT_COUNT: &str = "10";

/// Interval of the background project controller, in seconds.
pub const PROJECT_CONTROLLER_INTERVAL_SECS: u64 = 2;
