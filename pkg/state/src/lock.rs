use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct LockEntry {
    mutex: Arc<Mutex<()>>,
    last_used: Instant,
}

/// Per-id async mutexes serializing quota read-modify-write sequences.
///
/// Entries are created on first use and swept once they have been idle for
/// the TTL and nobody holds or waits on them.
#[derive(Clone)]
pub struct ProjectLockRegistry {
    locks: Arc<DashMap<String, LockEntry>>,
    ttl: Duration,
}

/// Held lock for one id. Released on drop.
pub struct ProjectLockGuard {
    id: String,
    locks: Arc<DashMap<String, LockEntry>>,
    _guard: OwnedMutexGuard<()>,
}

impl ProjectLockGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ProjectLockGuard {
    fn drop(&mut self) {
        if let Some(mut entry) = self.locks.get_mut(&self.id) {
            entry.last_used = Instant::now();
        }
    }
}

impl ProjectLockRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Wait for exclusive access to `id`. Only the calling task blocks.
    pub async fn acquire(&self, id: &str) -> ProjectLockGuard {
        let mutex = {
            let mut entry = self
                .locks
                .entry(id.to_string())
                .or_insert_with(|| LockEntry {
                    mutex: Arc::new(Mutex::new(())),
                    last_used: Instant::now(),
                });
            entry.last_used = Instant::now();
            entry.mutex.clone()
        };
        let guard = mutex.lock_owned().await;
        debug!("acquired project lock {}", id);
        ProjectLockGuard {
            id: id.to_string(),
            locks: self.locks.clone(),
            _guard: guard,
        }
    }

    /// Drop idle entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, entry| {
            Arc::strong_count(&entry.mutex) > 1 || entry.last_used.elapsed() < self.ttl
        });
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Sweep periodically until `cancel` fires.
    pub fn start_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();
        let period = (self.ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            info!("ProjectLockRegistry sweeper started (ttl={}s)", registry.ttl.as_secs());
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = registry.sweep();
                        if removed > 0 {
                            debug!("swept {} idle project locks", removed);
                        }
                    }
                }
            }
        })
    }
}
