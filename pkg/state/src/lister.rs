use pkg_types::meta::Resource;
use pkg_types::selector::LabelSelector;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::client::StateStore;
use crate::error::StoreError;
use crate::registry::Registry;
use crate::watch::{EventType, WatchEvent};

/// Read cache for one object kind, fed by the store's event log.
///
/// Reads first drain whatever events have been delivered, so a lister can
/// trail the store while a write is in flight but never reorders writes.
/// Callers must treat "missing here" and "already exists in the store" (and
/// the reverse) as normal.
pub struct Lister<T> {
    store: StateStore,
    state: Arc<Mutex<CacheState<T>>>,
}

impl<T> Clone for Lister<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            state: self.state.clone(),
        }
    }
}

struct CacheState<T> {
    objects: BTreeMap<String, T>,
    events: Receiver<WatchEvent>,
    last_seq: u64,
}

impl<T: Resource> Lister<T> {
    /// Subscribe to the event log and load the current objects.
    pub async fn start(store: StateStore) -> Result<Self, StoreError> {
        let events = store.event_log.subscribe();
        let last_seq = store.event_log.current_seq().await;
        let objects = Self::load(&store).await?;
        debug!("{} lister synced {} objects at seq {}", T::KIND, objects.len(), last_seq);
        Ok(Self {
            store,
            state: Arc::new(Mutex::new(CacheState {
                objects,
                events,
                last_seq,
            })),
        })
    }

    pub async fn get(&self, scope: &str, name: &str) -> Option<T> {
        let state = self.synced().await;
        state.objects.get(&Registry::<T>::key(scope, name)).cloned()
    }

    /// Cached objects in `scope` (or every scope) matching `selector`.
    pub async fn list(&self, scope: Option<&str>, selector: &LabelSelector) -> Vec<T> {
        let prefix = match scope {
            Some(scope) => Registry::<T>::scope_prefix(scope),
            None => Registry::<T>::kind_prefix(),
        };
        let state = self.synced().await;
        state
            .objects
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, obj)| selector.matches(&obj.meta().labels))
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    async fn synced(&self) -> MutexGuard<'_, CacheState<T>> {
        let mut state = self.state.lock().await;
        loop {
            match state.events.try_recv() {
                Ok(event) => Self::apply(&mut state, event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("{} lister missed {} events, catching up", T::KIND, missed);
                    self.catch_up(&mut state).await;
                }
            }
        }
        state
    }

    async fn catch_up(&self, state: &mut CacheState<T>) {
        if let Some(events) = self.store.event_log.events_since(state.last_seq).await {
            for event in events {
                Self::apply(state, event);
            }
            return;
        }
        let seq = self.store.event_log.current_seq().await;
        match Self::load(&self.store).await {
            Ok(objects) => {
                state.objects = objects;
                state.last_seq = seq;
            }
            // keep serving the old cache; the next read retries
            Err(e) => warn!("{} lister relist failed: {}", T::KIND, e),
        }
    }

    fn apply(state: &mut CacheState<T>, event: WatchEvent) {
        if event.seq <= state.last_seq {
            return;
        }
        state.last_seq = event.seq;
        if Registry::<T>::parse_key(&event.key).is_none() {
            return;
        }
        match (event.event_type, event.value) {
            (EventType::Put, Some(bytes)) => match Registry::<T>::decode(&event.key, &bytes) {
                Ok(obj) => {
                    state.objects.insert(event.key, obj);
                }
                Err(e) => warn!("{} lister skipped event {}: {}", T::KIND, event.seq, e),
            },
            (EventType::Put, None) => {}
            (EventType::Delete, _) => {
                state.objects.remove(&event.key);
            }
        }
    }

    async fn load(store: &StateStore) -> Result<BTreeMap<String, T>, StoreError> {
        let mut objects = BTreeMap::new();
        for (key, bytes) in store.list_prefix(&Registry::<T>::kind_prefix()).await? {
            match Registry::<T>::decode(&key, &bytes) {
                Ok(obj) => {
                    objects.insert(key, obj);
                }
                Err(e) => warn!("{} lister skipped {}: {}", T::KIND, key, e),
            }
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::{Cluster, Project};

    #[tokio::test]
    async fn follows_writes() {
        let store = StateStore::in_memory();
        let projects = Registry::<Project>::new(store.clone());
        projects.create(Project::new("c1", "before", "a")).await.unwrap();

        let lister = Lister::<Project>::start(store.clone()).await.unwrap();
        assert!(lister.get("c1", "before").await.is_some());

        projects.create(Project::new("c1", "after", "b")).await.unwrap();
        projects.create(Project::new("c2", "other", "c")).await.unwrap();
        let everything = LabelSelector::everything();
        assert_eq!(lister.list(Some("c1"), &everything).await.len(), 2);
        assert_eq!(lister.list(None, &everything).await.len(), 3);

        projects.delete("c1", "before").await.unwrap();
        assert!(lister.get("c1", "before").await.is_none());
    }

    #[tokio::test]
    async fn ignores_other_kinds() {
        let store = StateStore::in_memory();
        let lister = Lister::<Project>::start(store.clone()).await.unwrap();
        Registry::<Cluster>::new(store.clone())
            .create(Cluster::new("c1", "east"))
            .await
            .unwrap();
        assert!(lister.list(None, &LabelSelector::everything()).await.is_empty());
    }

    #[tokio::test]
    async fn sees_latest_version_after_updates() {
        let store = StateStore::in_memory();
        let projects = Registry::<Project>::new(store.clone());
        let lister = Lister::<Project>::start(store.clone()).await.unwrap();

        let mut project = projects.create(Project::new("c1", "p1", "a")).await.unwrap();
        for i in 0..3 {
            project.spec.description = format!("rev {}", i);
            project = projects.update(project).await.unwrap();
        }
        let cached = lister.get("c1", "p1").await.unwrap();
        assert_eq!(cached.spec.description, "rev 2");
        assert_eq!(cached.metadata.resource_version, 4);
    }
}
