use pkg_constants::quota::{
    DEFAULT_TENANT_CPU, DEFAULT_TENANT_MEMORY, DEFAULT_TENANT_OBJECT_COUNT,
    DEFAULT_TENANT_PORT_COUNT, DEFAULT_TENANT_STORAGE,
};
use pkg_quota::{ResourceKey, ResourceLimitSet};
use serde::{Deserialize, Serialize};

/// Server configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// port: 8443
/// data-dir: /var/lib/tenantd
/// token: my-secret-token
/// log-format: json
/// login-rate-limit: 2
/// tenant-quota:
///   limitsCpu: "20"
///   limitsMemory: 64Gi
/// provisioning:
///   poll-interval-ms: 500
///   project-ready-timeout-ms: 5000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// `text` (default) or `json`.
    #[serde(default, alias = "log-format")]
    pub log_format: Option<String>,
    /// Logins per second allowed from one client address. Unset or zero
    /// leaves logins unlimited.
    #[serde(default, alias = "login-rate-limit")]
    pub login_rate_limit: Option<f64>,
    /// Quota given to a tenant's project when it is created at login.
    #[serde(default, alias = "tenant-quota")]
    pub tenant_quota: Option<ResourceLimitSet>,
    #[serde(default)]
    pub provisioning: Option<ProvisioningConfigFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisioningConfigFile {
    #[serde(default, alias = "poll-interval-ms")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, alias = "project-ready-timeout-ms")]
    pub project_ready_timeout_ms: Option<u64>,
    #[serde(default, alias = "namespace-ready-timeout-ms")]
    pub namespace_ready_timeout_ms: Option<u64>,
    #[serde(default, alias = "lock-ttl-secs")]
    pub lock_ttl_secs: Option<u64>,
}

/// Quota a tenant project gets when none is configured.
pub fn default_tenant_quota() -> ResourceLimitSet {
    ResourceKey::ALL
        .into_iter()
        .map(|key| {
            let value = match key {
                k if k.is_cpu() => DEFAULT_TENANT_CPU,
                k if k.is_memory() => DEFAULT_TENANT_MEMORY,
                ResourceKey::RequestsStorage => DEFAULT_TENANT_STORAGE,
                ResourceKey::ServicesNodePorts | ResourceKey::ServicesLoadBalancers => {
                    DEFAULT_TENANT_PORT_COUNT
                }
                _ => DEFAULT_TENANT_OBJECT_COUNT,
            };
            (key, value.to_string())
        })
        .collect()
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
