use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::QuotaError;
use crate::key::ResourceKey;
use crate::quantity::Quantity;

/// A quota limit per resource key, kept as the text it was written with.
///
/// Keys that are absent are unconstrained; a key present with `"0"` is an
/// explicit zero. Unknown keys and empty values are dropped when decoding.
/// A set is never edited in place: build a new one with [`ResourceLimitSet::with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimitSet {
    limits: BTreeMap<ResourceKey, String>,
}

impl ResourceLimitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this set with `key` set to `value`.
    pub fn with(mut self, key: ResourceKey, value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            self.limits.remove(&key);
        } else {
            self.limits.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: ResourceKey) -> Option<&str> {
        self.limits.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: ResourceKey) -> bool {
        self.limits.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = ResourceKey> + '_ {
        self.limits.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKey, &str)> + '_ {
        self.limits.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Parse every value. Fails on the first malformed quantity.
    pub fn quantities(&self) -> Result<BTreeMap<ResourceKey, Quantity>, QuotaError> {
        self.limits
            .iter()
            .map(|(key, value)| Ok((*key, Quantity::parse(value)?)))
            .collect()
    }

    /// Render parsed quantities back into a limit set.
    pub fn from_quantities(quantities: &BTreeMap<ResourceKey, Quantity>) -> Self {
        Self {
            limits: quantities
                .iter()
                .map(|(key, quantity)| (*key, quantity.to_string()))
                .collect(),
        }
    }

    /// Same key set with every value set to `"0"`.
    pub fn zeroed(&self) -> Self {
        Self {
            limits: self.limits.keys().map(|k| (*k, "0".to_string())).collect(),
        }
    }

    /// Keep only the keys for which `keep` returns true.
    pub fn filtered(&self, mut keep: impl FnMut(ResourceKey) -> bool) -> Self {
        Self {
            limits: self
                .limits
                .iter()
                .filter(|(k, _)| keep(**k))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        }
    }

    /// Build from a cluster's allocatable capacity (`cpu`, `memory`,
    /// `services.nodeports`, ...). Resources without a quota key are ignored.
    pub fn from_allocatable(allocatable: &BTreeMap<String, String>) -> Self {
        allocatable
            .iter()
            .filter_map(|(name, value)| {
                ResourceKey::from_allocatable_name(name).map(|key| (key, value.clone()))
            })
            .collect()
    }

    /// Encode as the JSON stored in a quota annotation.
    pub fn to_annotation(&self) -> Result<String, QuotaError> {
        serde_json::to_string(self).map_err(|e| QuotaError::InvalidAnnotation(e.to_string()))
    }

    pub fn from_annotation(value: &str) -> Result<Self, QuotaError> {
        serde_json::from_str(value).map_err(|e| QuotaError::InvalidAnnotation(e.to_string()))
    }
}

impl FromIterator<(ResourceKey, String)> for ResourceLimitSet {
    fn from_iter<I: IntoIterator<Item = (ResourceKey, String)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |set, (key, value)| set.with(key, value))
    }
}

impl Serialize for ResourceLimitSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.limits.iter().map(|(k, v)| (k.quota_key(), v)))
    }
}

impl<'de> Deserialize<'de> for ResourceLimitSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(name, value)| {
                let key = ResourceKey::from_quota_key(&name)?;
                let text = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((key, text))
            })
            .collect())
    }
}
