use pkg_constants::labels::USER_PRINCIPAL_PREFIX;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the identity provider asserts about a tenant user at login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityAssertion {
    pub tenant_id: String,
    pub tenant_short_name: String,
    /// Opaque principal id from the provider. Used as the correlation label.
    pub principal_id: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Cluster key to the entitlement tokens granted on that cluster.
    #[serde(default)]
    pub cluster_actions: BTreeMap<String, Vec<String>>,
}

impl IdentityAssertion {
    /// Name written on display annotations.
    pub fn display_name(&self) -> &str {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.principal_id,
        }
    }

    pub fn user_principal_name(&self) -> String {
        format!("{}{}", USER_PRINCIPAL_PREFIX, self.principal_id)
    }

    /// Cluster keys with at least one action. Clusters with an empty action
    /// list are not part of the login.
    pub fn entitled_cluster_keys(&self) -> Vec<&str> {
        self.cluster_actions
            .iter()
            .filter(|(_, actions)| !actions.is_empty())
            .map(|(key, _)| key.as_str())
            .collect()
    }

    pub fn actions_for(&self, cluster_key: &str) -> &[String] {
        self.cluster_actions
            .get(cluster_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
