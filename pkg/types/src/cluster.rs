use pkg_constants::labels::{CLUSTER_KEY_LABEL, CPU_OVERCOMMIT_LABEL, MEMORY_OVERCOMMIT_LABEL};
use pkg_constants::state::KIND_CLUSTERS;
use pkg_quota::{OvercommitFactor, QuotaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::meta::{ObjectMeta, impl_resource};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSpec {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Allocatable capacity keyed by resource name (`cpu`, `memory`, `pods`, ...).
    #[serde(default)]
    pub allocatable: BTreeMap<String, String>,
}

/// A managed downstream cluster, as far as quota and access are concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
}

impl_resource!(Cluster, KIND_CLUSTERS);

impl Cluster {
    pub fn new(name: impl Into<String>, cluster_key: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            metadata: ObjectMeta::named(name.clone()).with_label(CLUSTER_KEY_LABEL, cluster_key),
            spec: ClusterSpec { display_name: name },
            status: ClusterStatus::default(),
        }
    }

    pub fn with_allocatable(mut self, resource: &str, value: &str) -> Self {
        self.status
            .allocatable
            .insert(resource.to_string(), value.to_string());
        self
    }

    /// Key the identity provider uses for this cluster.
    pub fn cluster_key(&self) -> Option<&str> {
        self.metadata.label(CLUSTER_KEY_LABEL)
    }

    pub fn display_name(&self) -> &str {
        if self.spec.display_name.is_empty() {
            &self.metadata.name
        } else {
            &self.spec.display_name
        }
    }

    /// Overcommit multipliers from the cluster labels. A missing label means
    /// no overcommit for that resource.
    pub fn overcommit(&self) -> Result<OvercommitFactor, QuotaError> {
        Ok(OvercommitFactor {
            cpu: self.factor(CPU_OVERCOMMIT_LABEL)?,
            memory: self.factor(MEMORY_OVERCOMMIT_LABEL)?,
        })
    }

    fn factor(&self, label: &str) -> Result<f64, QuotaError> {
        match self.metadata.label(label) {
            None => Ok(0.0),
            Some(value) => value
                .trim()
                .parse::<f64>()
                .map_err(|_| QuotaError::InvalidOvercommit {
                    label: label.to_string(),
                    value: value.to_string(),
                }),
        }
    }
}
