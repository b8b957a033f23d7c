use chrono::Utc;
use pkg_constants::state::{GENERATED_NAME_SUFFIX_LEN, REGISTRY_PREFIX};
use pkg_types::meta::Resource;
use pkg_types::selector::LabelSelector;
use pkg_types::validate::validate_name;
use std::marker::PhantomData;
use tracing::debug;

use crate::client::{StateStore, WriteOp};
use crate::error::StoreError;

/// Typed access to one object kind in the state store.
///
/// Objects live under `/registry/<kind>/<scope>/<name>`. Every write bumps
/// `metadata.resource_version`; `update` refuses to overwrite a version the
/// caller has not seen.
pub struct Registry<T> {
    store: StateStore,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: Resource> Registry<T> {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// `/registry/<kind>/`
    pub fn kind_prefix() -> String {
        format!("{}/{}/", REGISTRY_PREFIX, T::KIND)
    }

    pub fn scope_prefix(scope: &str) -> String {
        format!("{}{}/", Self::kind_prefix(), scope)
    }

    pub fn key(scope: &str, name: &str) -> String {
        format!("{}{}", Self::scope_prefix(scope), name)
    }

    pub fn key_of(obj: &T) -> String {
        Self::key(obj.scope(), obj.name())
    }

    /// Split a key of this kind into `(scope, name)`.
    pub fn parse_key(key: &str) -> Option<(&str, &str)> {
        key.strip_prefix(Self::kind_prefix().as_str())?.rsplit_once('/')
    }

    pub fn decode(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::Codec {
            kind: T::KIND,
            key: key.to_string(),
            source,
        })
    }

    fn encode(key: &str, obj: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(obj).map_err(|source| StoreError::Codec {
            kind: T::KIND,
            key: key.to_string(),
            source,
        })
    }

    pub async fn get(&self, scope: &str, name: &str) -> Result<T, StoreError> {
        self.try_get(scope, name)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                key: Self::key(scope, name),
            })
    }

    pub async fn try_get(&self, scope: &str, name: &str) -> Result<Option<T>, StoreError> {
        let key = Self::key(scope, name);
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(Self::decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Objects in `scope` (or in every scope) matching `selector`, in key order.
    pub async fn list(
        &self,
        scope: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<T>, StoreError> {
        let prefix = match scope {
            Some(scope) => Self::scope_prefix(scope),
            None => Self::kind_prefix(),
        };
        let mut objects = Vec::new();
        for (key, bytes) in self.store.list_prefix(&prefix).await? {
            let obj = Self::decode(&key, &bytes)?;
            if selector.matches(&obj.meta().labels) {
                objects.push(obj);
            }
        }
        Ok(objects)
    }

    /// Store a new object. An empty name is generated from
    /// `metadata.generate_name`.
    pub async fn create(&self, mut obj: T) -> Result<T, StoreError> {
        if obj.name().is_empty() {
            let prefix = obj.meta().generate_name.clone().unwrap_or_default();
            if prefix.is_empty() {
                return Err(StoreError::Invalid {
                    kind: T::KIND,
                    key: Self::scope_prefix(obj.scope()),
                    reason: "either name or generate_name is required".to_string(),
                });
            }
            obj.meta_mut().name = generate_name(&prefix);
        }
        let meta = obj.meta_mut();
        meta.resource_version = 1;
        meta.created_at = Some(Utc::now());

        let key = Self::key_of(&obj);
        if let Err(e) = validate_name(obj.name()) {
            return Err(StoreError::Invalid {
                kind: T::KIND,
                key,
                reason: e.to_string(),
            });
        }
        let bytes = Self::encode(&key, &obj)?;

        self.store
            .read_modify_write(&key, |current| match current {
                Some(_) => Err(StoreError::AlreadyExists {
                    kind: T::KIND,
                    key: key.clone(),
                }),
                None => Ok((WriteOp::Put(bytes), ())),
            })
            .await?;
        debug!("created {}", key);
        Ok(obj)
    }

    /// Replace a stored object. Fails with `Conflict` when the stored
    /// version differs from `obj.metadata.resource_version`.
    pub async fn update(&self, mut obj: T) -> Result<T, StoreError> {
        let key = Self::key_of(&obj);
        let updated = self
            .store
            .read_modify_write(&key, |current| {
                let Some(bytes) = current else {
                    return Err(StoreError::NotFound {
                        kind: T::KIND,
                        key: key.clone(),
                    });
                };
                let stored = Self::decode(&key, bytes)?;
                let actual = stored.meta().resource_version;
                let expected = obj.meta().resource_version;
                if actual != expected {
                    return Err(StoreError::Conflict {
                        kind: T::KIND,
                        key: key.clone(),
                        expected,
                        actual,
                    });
                }
                let meta = obj.meta_mut();
                meta.resource_version = actual + 1;
                meta.created_at = stored.meta().created_at;
                let bytes = Self::encode(&key, &obj)?;
                Ok((WriteOp::Put(bytes), obj))
            })
            .await?;
        debug!("updated {} to version {}", key, updated.meta().resource_version);
        Ok(updated)
    }

    /// Delete and return the stored object.
    pub async fn delete(&self, scope: &str, name: &str) -> Result<T, StoreError> {
        let key = Self::key(scope, name);
        let deleted = self
            .store
            .read_modify_write(&key, |current| match current {
                Some(bytes) => Ok((WriteOp::Delete, Self::decode(&key, bytes)?)),
                None => Err(StoreError::NotFound {
                    kind: T::KIND,
                    key: key.clone(),
                }),
            })
            .await?;
        debug!("deleted {}", key);
        Ok(deleted)
    }

    /// Delete if present. Returns whether anything was removed.
    pub async fn delete_if_exists(&self, scope: &str, name: &str) -> Result<bool, StoreError> {
        match self.delete(scope, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn generate_name(prefix: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(GENERATED_NAME_SUFFIX_LEN)
        .collect();
    format!("{}{}", prefix, suffix)
}
