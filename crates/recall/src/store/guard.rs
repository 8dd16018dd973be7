//! Concurrency guard: per-entity locks and write coalescing.
//!
//! The model is single-writer-per-entity with multiple concurrent
//! readers. A per-id lock (keyed map with reference counting) serializes
//! mutations of one entity; a coarse per-root read/write lock lets bulk
//! operations (cold-start scan, backup, recovery) exclude writers.
//!
//! Rapid repeated writes to the same file coalesce: the [`WriteBuffer`]
//! holds the latest rendered contents for up to 50 ms and a background
//! flusher writes the final state once, via the atomic temp-then-rename
//! path. In-memory state is authoritative between flushes; readers
//! consult the pending buffer before the filesystem.

use crate::error::{Error, Result};
use recall_markdown::write_atomic;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// How long rapid writes to one file coalesce before flushing.
pub(crate) const COALESCE_WINDOW: Duration = Duration::from_millis(50);

const MAX_FLUSH_ATTEMPTS: u32 = 3;

struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    refs: usize,
}

/// Per-entity lock map plus per-root scan locks.
pub(crate) struct Guard {
    locks: Arc<StdMutex<HashMap<String, LockEntry>>>,
    memories_root: RwLock<()>,
    tasks_root: RwLock<()>,
    pub(crate) writes: Arc<WriteBuffer>,
}

impl Guard {
    pub(crate) fn new() -> Self {
        Self {
            locks: Arc::new(StdMutex::new(HashMap::new())),
            memories_root: RwLock::new(()),
            tasks_root: RwLock::new(()),
            writes: Arc::new(WriteBuffer::new(COALESCE_WINDOW)),
        }
    }

    /// Acquire the exclusive lock for one entity id. Held across the
    /// whole read-modify-write; the entry is removed when the last
    /// holder drops.
    pub(crate) async fn lock_id(&self, key: &str) -> IdGuard {
        let lock = {
            let mut map = self.locks.lock().expect("lock map mutex poisoned");
            let entry = map.entry(key.to_string()).or_insert_with(|| LockEntry {
                lock: Arc::new(AsyncMutex::new(())),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.lock)
        };
        let guard = lock.lock_owned().await;
        IdGuard {
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
            _guard: guard,
        }
    }

    /// The coarse lock over the memories root. Writers take `read`,
    /// bulk scans and backups take `write`.
    pub(crate) fn memories_root(&self) -> &RwLock<()> {
        &self.memories_root
    }

    /// The coarse lock over the tasks root.
    pub(crate) fn tasks_root(&self) -> &RwLock<()> {
        &self.tasks_root
    }

    /// Number of live per-id lock entries (for tests).
    #[cfg(test)]
    pub(crate) fn lock_entries(&self) -> usize {
        self.locks.lock().expect("lock map mutex poisoned").len()
    }
}

/// Holder of one entity's exclusive lock.
pub(crate) struct IdGuard {
    key: String,
    locks: Arc<StdMutex<HashMap<String, LockEntry>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for IdGuard {
    fn drop(&mut self) {
        let mut map = self.locks.lock().expect("lock map mutex poisoned");
        if let Some(entry) = map.get_mut(&self.key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                map.remove(&self.key);
            }
        }
    }
}

struct Pending {
    contents: String,
    due: Instant,
    attempts: u32,
}

/// Coalescing write-behind buffer.
pub(crate) struct WriteBuffer {
    pending: StdMutex<HashMap<PathBuf, Pending>>,
    notify: Notify,
    window: Duration,
}

impl WriteBuffer {
    fn new(window: Duration) -> Self {
        Self {
            pending: StdMutex::new(HashMap::new()),
            notify: Notify::new(),
            window,
        }
    }

    /// Queue (or replace) the contents to be written to `path`. The
    /// flush deadline is set by the first patch in the window, so a
    /// steady stream of updates still flushes every window.
    pub(crate) fn enqueue(&self, path: &Path, contents: String) {
        {
            let mut pending = self.pending.lock().expect("write buffer mutex poisoned");
            match pending.get_mut(path) {
                Some(entry) => entry.contents = contents,
                None => {
                    pending.insert(
                        path.to_path_buf(),
                        Pending {
                            contents,
                            due: Instant::now() + self.window,
                            attempts: 0,
                        },
                    );
                }
            }
        }
        self.notify.notify_one();
    }

    /// The queued contents for `path`, if a write is pending.
    pub(crate) fn pending_contents(&self, path: &Path) -> Option<String> {
        self.pending
            .lock()
            .expect("write buffer mutex poisoned")
            .get(path)
            .map(|p| p.contents.clone())
    }

    /// Drop any queued write for `path` without flushing (delete path).
    pub(crate) fn discard(&self, path: &Path) {
        self.pending
            .lock()
            .expect("write buffer mutex poisoned")
            .remove(path);
    }

    /// Flush one path immediately, if queued.
    pub(crate) async fn flush_path(&self, path: &Path) -> Result<()> {
        let contents = {
            self.pending
                .lock()
                .expect("write buffer mutex poisoned")
                .remove(path)
                .map(|p| p.contents)
        };
        if let Some(contents) = contents {
            write_atomic(path, &contents).await?;
        }
        Ok(())
    }

    /// Flush everything immediately.
    pub(crate) async fn flush_all(&self) -> Result<()> {
        let drained: Vec<(PathBuf, String)> = {
            let mut pending = self.pending.lock().expect("write buffer mutex poisoned");
            pending
                .drain()
                .map(|(path, p)| (path, p.contents))
                .collect()
        };
        for (path, contents) in drained {
            write_atomic(&path, &contents).await?;
        }
        Ok(())
    }

    fn take_due(&self, now: Instant) -> Vec<(PathBuf, String, u32)> {
        let mut pending = self.pending.lock().expect("write buffer mutex poisoned");
        let due_paths: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(path, _)| path.clone())
            .collect();
        due_paths
            .into_iter()
            .filter_map(|path| {
                pending
                    .remove(&path)
                    .map(|p| (path, p.contents, p.attempts))
            })
            .collect()
    }

    fn requeue_failed(&self, path: PathBuf, contents: String, attempts: u32) {
        let mut pending = self.pending.lock().expect("write buffer mutex poisoned");
        // A newer write superseded the failed one; keep the newer state.
        if pending.contains_key(&path) {
            return;
        }
        pending.insert(
            path,
            Pending {
                contents,
                due: Instant::now() + self.window,
                attempts,
            },
        );
    }

    fn next_due(&self) -> Option<Instant> {
        self.pending
            .lock()
            .expect("write buffer mutex poisoned")
            .values()
            .map(|p| p.due)
            .min()
    }

    /// Whether any write is queued.
    pub(crate) fn is_empty(&self) -> bool {
        self.pending
            .lock()
            .expect("write buffer mutex poisoned")
            .is_empty()
    }
}

/// Spawn the background flusher draining a [`WriteBuffer`].
pub(crate) fn spawn_flusher(buffer: Arc<WriteBuffer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match buffer.next_due() {
                Some(due) => {
                    tokio::select! {
                        () = tokio::time::sleep_until(due) => {}
                        () = buffer.notify.notified() => continue,
                    }
                }
                None => buffer.notify.notified().await,
            }

            for (path, contents, attempts) in buffer.take_due(Instant::now()) {
                if let Err(e) = write_atomic(&path, &contents).await {
                    let error = Error::from(e);
                    let attempts = attempts + 1;
                    // Only transient failures earn a retry; a permanent
                    // one (permissions, missing directory) would fail
                    // identically every attempt.
                    if error.is_transient() && attempts < MAX_FLUSH_ATTEMPTS {
                        tracing::warn!(
                            path = %path.display(),
                            error = %error,
                            attempts,
                            "transient flush failure; retrying"
                        );
                        buffer.requeue_failed(path, contents, attempts);
                    } else {
                        tracing::error!(
                            path = %path.display(),
                            error = %error,
                            attempts,
                            "dropping coalesced write"
                        );
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn id_locks_serialize_and_clean_up() {
        let guard = Arc::new(Guard::new());

        let first = guard.lock_id("task-1").await;
        assert_eq!(guard.lock_entries(), 1);

        let contended = Arc::clone(&guard);
        let waiter = tokio::spawn(async move {
            let _second = contended.lock_id("task-1").await;
        });

        // The waiter cannot acquire while we hold the lock.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(guard.lock_entries(), 0);
    }

    #[tokio::test]
    async fn distinct_ids_do_not_contend() {
        let guard = Guard::new();
        let _a = guard.lock_id("task-1").await;
        let _b = guard.lock_id("task-2").await;
        assert_eq!(guard.lock_entries(), 2);
    }

    #[tokio::test]
    async fn rapid_writes_coalesce_to_final_state() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("note.md");
        let buffer = Arc::new(WriteBuffer::new(Duration::from_millis(50)));
        let flusher = spawn_flusher(Arc::clone(&buffer));

        buffer.enqueue(&target, "one".to_string());
        buffer.enqueue(&target, "two".to_string());
        buffer.enqueue(&target, "three".to_string());

        // Within the window the file does not exist yet, but the
        // pending contents are readable.
        assert_eq!(buffer.pending_contents(&target).as_deref(), Some("three"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let contents = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(contents, "three");
        assert!(buffer.is_empty());

        flusher.abort();
    }

    #[tokio::test]
    async fn flush_all_drains_immediately() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.md");
        let b = temp.path().join("b.md");
        let buffer = WriteBuffer::new(Duration::from_secs(60));

        buffer.enqueue(&a, "alpha".to_string());
        buffer.enqueue(&b, "beta".to_string());
        buffer.flush_all().await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&a).await.unwrap(), "alpha");
        assert_eq!(tokio::fs::read_to_string(&b).await.unwrap(), "beta");
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn discard_drops_a_queued_write() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("gone.md");
        let buffer = WriteBuffer::new(Duration::from_secs(60));

        buffer.enqueue(&target, "doomed".to_string());
        buffer.discard(&target);
        buffer.flush_all().await.unwrap();

        assert!(!target.exists());
    }
}
