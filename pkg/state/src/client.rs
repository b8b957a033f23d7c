use pkg_constants::state::EVENT_LOG_CAPACITY;
use slatedb::Db;
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::path::Path;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::watch::{EventLog, EventType};

#[derive(Clone)]
enum Backend {
    /// SlateDB on a local filesystem.
    Slate(Db),
    /// Plain ordered map, for tests and `--in-memory` runs.
    Memory(Arc<RwLock<BTreeMap<String, Vec<u8>>>>),
}

/// What a read-modify-write closure wants done with the key.
pub enum WriteOp {
    Put(Vec<u8>),
    Delete,
    Keep,
}

/// Key/value state store. Every mutation is recorded in `event_log` so
/// listers can follow it.
///
/// Writes are serialized through one store-wide mutex, which is what makes
/// [`StateStore::read_modify_write`] atomic on top of SlateDB.
#[derive(Clone)]
pub struct StateStore {
    backend: Backend,
    write_lock: Arc<Mutex<()>>,
    pub event_log: EventLog,
}

impl StateStore {
    /// Open (or create) a state store rooted at `path` on the local filesystem.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        info!("Opening SlateDB state store at {}", path);

        // Ensure the data directory exists before opening the object store
        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory {}: {}", path, e))?;

        let object_store = Arc::new(
            LocalFileSystem::new_with_prefix(path)
                .map_err(|e| anyhow::anyhow!("Failed to create local object store: {}", e))?,
        );
        let db = Db::open(Path::from("/"), object_store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open SlateDB: {}", e))?;
        Ok(Self::with_backend(Backend::Slate(db)))
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory(Arc::new(RwLock::new(BTreeMap::new()))))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            write_lock: Arc::new(Mutex::new(())),
            event_log: EventLog::new(EVENT_LOG_CAPACITY),
        }
    }

    #[cfg(test)]
    async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let _write = self.write_lock.lock().await;
        self.raw_put(key, value).await?;
        self.event_log
            .emit(EventType::Put, key.to_string(), Some(value.to_vec()))
            .await;
        Ok(())
    }

    /// Retrieve the value for a key, or `None` if it does not exist.
    pub async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match &self.backend {
            Backend::Slate(db) => match db.get(key.as_bytes()).await {
                Ok(Some(bytes)) => Ok(Some(bytes.to_vec())),
                Ok(None) => Ok(None),
                Err(e) => Err(anyhow::anyhow!("SlateDB get failed: {}", e)),
            },
            Backend::Memory(map) => Ok(map.read().await.get(key).cloned()),
        }
    }

    /// Delete a key. Returns whether it existed.
    #[cfg(test)]
    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        self.read_modify_write(key, |current| {
            let existed = current.is_some();
            let op = if existed { WriteOp::Delete } else { WriteOp::Keep };
            Ok::<_, anyhow::Error>((op, existed))
        })
        .await
    }

    /// Write `value` only if `key` is absent. Returns whether it was written.
    #[cfg(test)]
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        self.read_modify_write(key, |current| {
            Ok::<_, anyhow::Error>(match current {
                Some(_) => (WriteOp::Keep, false),
                None => (WriteOp::Put(value.to_vec()), true),
            })
        })
        .await
    }

    /// Read `key`, let `decide` choose a write based on the current bytes,
    /// and apply it with no other writer in between.
    pub async fn read_modify_write<T, E, F>(&self, key: &str, decide: F) -> Result<T, E>
    where
        F: FnOnce(Option<&[u8]>) -> Result<(WriteOp, T), E>,
        E: From<anyhow::Error>,
    {
        let _write = self.write_lock.lock().await;
        let current = self.get(key).await?;
        let (op, result) = decide(current.as_deref())?;
        match op {
            WriteOp::Put(value) => {
                self.raw_put(key, &value).await?;
                self.event_log
                    .emit(EventType::Put, key.to_string(), Some(value))
                    .await;
            }
            WriteOp::Delete => {
                self.raw_delete(key).await?;
                self.event_log
                    .emit(EventType::Delete, key.to_string(), None)
                    .await;
            }
            WriteOp::Keep => {}
        }
        Ok(result)
    }

    /// List all key-value pairs whose keys start with `prefix`.
    /// Returns them as `(key_string, raw_bytes)`.
    pub async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
        match &self.backend {
            Backend::Slate(db) => {
                let mut results = Vec::new();
                let mut iter = db
                    .scan_prefix(prefix.as_bytes())
                    .await
                    .map_err(|e| anyhow::anyhow!("SlateDB scan_prefix failed: {}", e))?;

                while let Ok(Some(kv)) = iter.next().await {
                    let key = String::from_utf8_lossy(&kv.key).to_string();
                    results.push((key, kv.value.to_vec()));
                }
                Ok(results)
            }
            Backend::Memory(map) => Ok(map
                .read()
                .await
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
        }
    }

    /// Gracefully close the state store.
    pub async fn close(self) -> anyhow::Result<()> {
        match self.backend {
            Backend::Slate(db) => {
                info!("Closing SlateDB state store");
                db.close()
                    .await
                    .map_err(|e| anyhow::anyhow!("SlateDB close failed: {}", e))
            }
            Backend::Memory(_) => Ok(()),
        }
    }

    async fn raw_put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        match &self.backend {
            Backend::Slate(db) => db
                .put(key.as_bytes(), value)
                .await
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!("SlateDB put failed: {}", e)),
            Backend::Memory(map) => {
                map.write().await.insert(key.to_string(), value.to_vec());
                Ok(())
            }
        }
    }

    async fn raw_delete(&self, key: &str) -> anyhow::Result<()> {
        match &self.backend {
            Backend::Slate(db) => db
                .delete(key.as_bytes())
                .await
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!("SlateDB delete failed: {}", e)),
            Backend::Memory(map) => {
                map.write().await.remove(key);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_basic_ops() {
        let store = StateStore::in_memory();
        store.put("/a/1", b"one").await.unwrap();
        store.put("/a/2", b"two").await.unwrap();
        store.put("/b/1", b"other").await.unwrap();

        assert_eq!(store.get("/a/1").await.unwrap(), Some(b"one".to_vec()));
        let listed = store.list_prefix("/a/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "/a/1");

        assert!(store.delete("/a/1").await.unwrap());
        assert!(!store.delete("/a/1").await.unwrap());
        assert_eq!(store.get("/a/1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_if_absent_writes_once() {
        let store = StateStore::in_memory();
        assert!(store.put_if_absent("/k", b"first").await.unwrap());
        assert!(!store.put_if_absent("/k", b"second").await.unwrap());
        assert_eq!(store.get("/k").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn mutations_are_logged_in_order() {
        let store = StateStore::in_memory();
        store.put("/k", b"v1").await.unwrap();
        store.put_if_absent("/k", b"ignored").await.unwrap();
        store.delete("/k").await.unwrap();

        let events = store.event_log.events_since(0).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(kinds, vec![EventType::Put, EventType::Delete]);
        assert_eq!(store.event_log.current_seq().await, 2);
    }
}
