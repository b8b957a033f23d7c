use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::QuotaError;
use crate::key::ResourceKey;
use crate::limits::ResourceLimitSet;
use crate::quantity::Quantity;

/// Outcome of a fit check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FitReport {
    pub fits: bool,
    /// `"key=sum"` for every exceeded key, sorted by key.
    pub violations: Vec<String>,
}

impl FitReport {
    fn fits() -> Self {
        Self {
            fits: true,
            violations: Vec::new(),
        }
    }

    /// Violations joined the way they appear in user-facing errors.
    pub fn message(&self) -> String {
        self.violations.join(",")
    }
}

/// Cluster overcommit multipliers for cpu and memory.
///
/// A multiplier above 1 lets the sum of project quotas exceed the raw
/// capacity by that ratio; a multiplier of 0 or below disables overcommit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OvercommitFactor {
    pub cpu: f64,
    pub memory: f64,
}

impl OvercommitFactor {
    pub fn none() -> Self {
        Self::default()
    }

    fn factor_for(&self, key: ResourceKey) -> f64 {
        if key.is_cpu() {
            self.cpu
        } else if key.is_memory() {
            self.memory
        } else {
            0.0
        }
    }
}

/// A project's quota claim against its cluster, keyed by `<cluster>:<project>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectClaim {
    pub id: String,
    pub limit: ResourceLimitSet,
}

impl ProjectClaim {
    pub fn new(id: impl Into<String>, limit: ResourceLimitSet) -> Self {
        Self {
            id: id.into(),
            limit,
        }
    }
}

/// Sum limit sets per key.
pub fn aggregate<'a>(
    sets: impl IntoIterator<Item = &'a ResourceLimitSet>,
) -> Result<BTreeMap<ResourceKey, Quantity>, QuotaError> {
    let mut total: BTreeMap<ResourceKey, Quantity> = BTreeMap::new();
    for set in sets {
        for (key, quantity) in set.quantities()? {
            let entry = total.entry(key).or_default();
            *entry = entry.plus(&quantity);
        }
    }
    Ok(total)
}

/// Compare a per-key sum against a limit. Keys whose limit is zero or absent
/// are unconstrained.
pub fn less_than_or_equal(
    sum: &BTreeMap<ResourceKey, Quantity>,
    limit: &BTreeMap<ResourceKey, Quantity>,
) -> FitReport {
    let mut violations: Vec<(ResourceKey, String)> = limit
        .iter()
        .filter(|(_, max)| !max.is_zero())
        .filter_map(|(key, max)| {
            let used = sum.get(key)?;
            (!used.fits_within(max)).then(|| (*key, format!("{}={}", key, used)))
        })
        .collect();

    if violations.is_empty() {
        return FitReport::fits();
    }
    violations.sort_by(|a, b| a.0.quota_key().cmp(b.0.quota_key()));
    FitReport {
        fits: false,
        violations: violations.into_iter().map(|(_, v)| v).collect(),
    }
}

/// Does `candidate` plus all `siblings` fit inside `parent`?
pub fn fits_within_parent(
    candidate: &ResourceLimitSet,
    siblings: &[ResourceLimitSet],
    parent: &ResourceLimitSet,
) -> Result<FitReport, QuotaError> {
    let sum = aggregate(std::iter::once(candidate).chain(siblings.iter()))?;
    let limit = parent.quantities()?;
    Ok(less_than_or_equal(&sum, &limit))
}

/// Does the candidate project, together with every other project on the
/// cluster, fit the cluster's allocatable capacity?
///
/// A claim in `others` with the candidate's id is the stored copy of the
/// project being edited and is skipped. Cpu and memory capacity is scaled by
/// the overcommit factor before comparing.
pub fn fits_cluster_with_overcommit(
    candidate: &ProjectClaim,
    others: &[ProjectClaim],
    allocatable: &BTreeMap<String, String>,
    overcommit: OvercommitFactor,
) -> Result<FitReport, QuotaError> {
    let sum = aggregate(
        std::iter::once(&candidate.limit).chain(
            others
                .iter()
                .filter(|claim| claim.id != candidate.id)
                .map(|claim| &claim.limit),
        ),
    )?;

    let capacity: BTreeMap<ResourceKey, Quantity> = ResourceLimitSet::from_allocatable(allocatable)
        .quantities()?
        .into_iter()
        .map(|(key, quantity)| (key, quantity.scale(overcommit.factor_for(key))))
        .collect();

    debug!(
        "cluster fit for {}: demand={:?} capacity={:?}",
        candidate.id,
        ResourceLimitSet::from_quantities(&sum),
        ResourceLimitSet::from_quantities(&capacity)
    );
    Ok(less_than_or_equal(&sum, &capacity))
}

/// A namespace default quota must declare exactly the keys of its project quota.
pub fn validate_namespace_default(
    project: &ResourceLimitSet,
    namespace_default: &ResourceLimitSet,
) -> Result<(), QuotaError> {
    if namespace_default.len() != project.len() {
        return Err(QuotaError::missing_field(
            "namespaceDefaultResourceQuota",
            "does not have all fields defined on a resourceQuota",
        ));
    }
    if let Some(missing) = project.keys().find(|k| !namespace_default.contains(*k)) {
        return Err(QuotaError::missing_field(
            "namespaceDefaultResourceQuota",
            format!("misses {} defined on a resourceQuota", missing),
        ));
    }
    Ok(())
}
