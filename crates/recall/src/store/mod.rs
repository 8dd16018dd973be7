//! The dual entity store: memories and tasks as per-project markdown
//! files with an in-memory index.
//!
//! # Architecture
//!
//! The filesystem is the ground truth. [`StoreIndex`] is a rebuildable
//! cache populated by a one-time cold-start scan; every mutation goes
//! through the [`guard`] layer (per-id locks, coalesced atomic writes)
//! and updates the index afterwards. Readers never take the per-id
//! lock; they read the coalescing buffer first, then the file.
//!
//! Change events are not emitted here: the filesystem watcher observes
//! the rename commits and publishes events for internal and external
//! mutations alike.

pub(crate) mod guard;
pub(crate) mod index;

mod memory_ops;
mod task_ops;

pub use index::CorruptFile;

use crate::domain::{Memory, Task};
use crate::error::{Error, Result};
use crate::id::IdGenerator;
use crate::paths::Roots;
use guard::Guard;
use index::StoreIndex;
use recall_markdown::Document;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// The entity store over one set of validated roots.
pub struct Store {
    roots: Roots,
    pub(crate) index: Arc<RwLock<StoreIndex>>,
    pub(crate) guard: Guard,
    pub(crate) memory_id_gen: StdMutex<IdGenerator>,
    pub(crate) task_id_gen: StdMutex<IdGenerator>,
    file_counter: AtomicU64,
    flusher: JoinHandle<()>,
}

impl Store {
    /// Open the store: scan both roots, build the index, and start the
    /// background write flusher.
    ///
    /// Corrupt files are logged, skipped and kept on the index's
    /// corrupt list for the health check; they never fail the open.
    ///
    /// # Errors
    ///
    /// Returns an error only when a root directory cannot be read.
    pub async fn open(roots: Roots) -> Result<Self> {
        let guard = Guard::new();
        let flusher = guard::spawn_flusher(Arc::clone(&guard.writes));

        let store = Self {
            roots,
            index: Arc::new(RwLock::new(StoreIndex::new())),
            guard,
            memory_id_gen: StdMutex::new(IdGenerator::new("mem")),
            task_id_gen: StdMutex::new(IdGenerator::new("task")),
            file_counter: AtomicU64::new(1),
            flusher,
        };
        store.rescan().await?;
        Ok(store)
    }

    /// The roots this store operates within.
    #[must_use]
    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    /// Shared handle to the index (used by the watcher for path -> id
    /// resolution).
    pub(crate) fn index_handle(&self) -> Arc<RwLock<StoreIndex>> {
        Arc::clone(&self.index)
    }

    /// Flush all coalesced writes to disk now.
    ///
    /// # Errors
    ///
    /// Returns the first write failure.
    pub async fn flush(&self) -> Result<()> {
        self.guard.writes.flush_all().await
    }

    /// Hold both root write locks, excluding every writer. Backup
    /// snapshots take this so no tree is copied mid-mutation.
    pub(crate) async fn quiesce(
        &self,
    ) -> (
        tokio::sync::RwLockWriteGuard<'_, ()>,
        tokio::sync::RwLockWriteGuard<'_, ()>,
    ) {
        let memories = self.guard.memories_root().write().await;
        let tasks = self.guard.tasks_root().write().await;
        (memories, tasks)
    }

    /// Files that failed to parse during the last scan.
    pub async fn corrupt_files(&self) -> Vec<CorruptFile> {
        self.index.read().await.corrupt.clone()
    }

    /// Rebuild the index from the filesystem.
    ///
    /// Takes both root write locks: no entity mutation runs while the
    /// scan is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error when a root directory cannot be read.
    pub async fn rescan(&self) -> Result<()> {
        let _memories_scan = self.guard.memories_root().write().await;
        let _tasks_scan = self.guard.tasks_root().write().await;

        sweep_stale_temps(&self.roots.memories).await;
        sweep_stale_temps(&self.roots.tasks).await;

        let mut fresh = StoreIndex::new();
        self.scan_memories(&mut fresh).await?;
        self.scan_tasks(&mut fresh).await?;

        {
            let mut generator = self
                .memory_id_gen
                .lock()
                .expect("id generator mutex poisoned");
            for id in fresh.memories.keys() {
                generator.register(id.as_str());
            }
        }
        {
            let mut generator = self.task_id_gen.lock().expect("id generator mutex poisoned");
            for id in fresh.tasks.keys() {
                generator.register(id.as_str());
            }
        }

        if !fresh.corrupt.is_empty() {
            tracing::warn!(
                count = fresh.corrupt.len(),
                "skipping corrupt entity files; see health check"
            );
        }

        *self.index.write().await = fresh;
        Ok(())
    }

    async fn scan_memories(&self, index: &mut StoreIndex) -> Result<()> {
        for file in list_markdown_files(&self.roots.memories).await? {
            match self.load_document(&file).await {
                Ok(doc) => match Memory::from_document(&doc) {
                    Ok(memory) => index.insert_memory(&memory, file),
                    Err(reason) => {
                        tracing::warn!(file = %file.display(), %reason, "corrupt memory file");
                        index.corrupt.push(CorruptFile { path: file, reason });
                    }
                },
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "unreadable memory file");
                    index.corrupt.push(CorruptFile {
                        path: file,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn scan_tasks(&self, index: &mut StoreIndex) -> Result<()> {
        for file in list_markdown_files(&self.roots.tasks).await? {
            match self.load_document(&file).await {
                Ok(doc) => match Task::from_document(&doc) {
                    Ok(task) => index.insert_task(&task, file),
                    Err(reason) => {
                        tracing::warn!(file = %file.display(), %reason, "corrupt task file");
                        index.corrupt.push(CorruptFile { path: file, reason });
                    }
                },
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "unreadable task file");
                    index.corrupt.push(CorruptFile {
                        path: file,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Read a document, preferring un-flushed coalesced contents.
    pub(crate) async fn load_document(&self, path: &Path) -> Result<Document> {
        let text = match self.guard.writes.pending_contents(path) {
            Some(pending) => pending,
            None => tokio::fs::read_to_string(path).await?,
        };
        let (doc, warnings) = Document::parse(&text);
        for warning in &warnings {
            tracing::debug!(file = %path.display(), %warning, "front-matter warning");
        }
        Ok(doc)
    }

    /// Read and parse a memory file, mapping parse defects to
    /// [`Error::Corrupt`].
    pub(crate) async fn load_memory(&self, path: &Path) -> Result<Memory> {
        let doc = self.load_document(path).await?;
        Memory::from_document(&doc).map_err(|reason| Error::Corrupt {
            file: path.to_path_buf(),
            reason,
        })
    }

    /// Read and parse a task file, mapping parse defects to
    /// [`Error::Corrupt`].
    pub(crate) async fn load_task(&self, path: &Path) -> Result<Task> {
        let doc = self.load_document(path).await?;
        Task::from_document(&doc).map_err(|reason| Error::Corrupt {
            file: path.to_path_buf(),
            reason,
        })
    }

    /// Next value of the process-local filename counter, as a six-digit
    /// suffix.
    pub(crate) fn next_file_suffix(&self) -> String {
        let n = self.file_counter.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        format!("{n:06}")
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.flusher.abort();
    }
}

/// Discard `.tmp` leftovers from writes interrupted by a crash or a
/// deadline: a partial write not committed via rename is not data.
async fn sweep_stale_temps(root: &Path) {
    let Ok(mut projects) = tokio::fs::read_dir(root).await else {
        return;
    };
    while let Ok(Some(project)) = projects.next_entry().await {
        let Ok(file_type) = project.file_type().await else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let Ok(mut entries) = tokio::fs::read_dir(project.path()).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                tracing::debug!(file = %path.display(), "removing stale temp file");
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
    }
}

/// All `.md` files under `<root>/<project>/`, one level deep.
async fn list_markdown_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut projects = match tokio::fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };

    while let Some(project) = projects.next_entry().await? {
        if !project.file_type().await?.is_dir() {
            continue;
        }
        let mut entries = tokio::fs::read_dir(project.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "md") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Derive a filename slug from the leading content characters:
/// lowercase, non-word characters stripped, whitespace collapsed to
/// `-`.
pub(crate) fn slug(text: &str, fallback: &str) -> String {
    let prefix: String = text.chars().take(30).collect();
    let mut out = String::with_capacity(prefix.len());
    let mut last_dash = false;
    for c in prefix.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if c.is_whitespace() || c == '-' || c == '_' {
            if !last_dash && !out.is_empty() {
                out.push('-');
            }
            last_dash = true;
        }
        // Everything else is stripped.
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::simple("API retry logic", "api-retry-logic")]
    #[case::truncated(
        "A very long memory content that keeps going",
        "a-very-long-memory-content-tha"
    )]
    #[case::punctuation("Fix: the {bug}!", "fix-the-bug")]
    #[case::unicode_stripped("日本語 note", "note")]
    #[case::empty("", "note")]
    #[case::only_symbols("!!!", "note")]
    fn slug_derivation(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slug(input, "note"), expected);
    }

    #[test]
    fn file_suffix_is_six_digits_and_advances() {
        let roots_dir = tempfile::tempdir().unwrap();
        let roots = Roots::from_dirs(
            roots_dir.path().join("m"),
            roots_dir.path().join("t"),
            roots_dir.path().join("d"),
        )
        .unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let store = Store::open(roots).await.unwrap();
            let a = store.next_file_suffix();
            let b = store.next_file_suffix();
            assert_eq!(a.len(), 6);
            assert_ne!(a, b);
        });
    }
}
