//! The root context wiring every subsystem together.
//!
//! A [`Service`] owns the store, linker, backup manager, event bus,
//! watcher and vector index for one set of validated roots. Everything
//! is explicitly constructed here and threaded through; there are no
//! global singletons. The tool gateway talks to the service only.

use crate::backup::BackupManager;
use crate::domain::{
    Memory, MemoryFilter, MemoryId, MemoryUpdate, NewMemory, NewTask, Task, TaskFilter, TaskId,
    TaskUpdate,
};
use crate::error::{Error, Result};
use crate::events::{EventBus, Subscription, DEFAULT_BUS_CAPACITY};
use crate::linker::Linker;
use crate::paths::Roots;
use crate::settings::Settings;
use crate::store::{CorruptFile, Store};
use crate::vector::VectorIndex;
use crate::watch::{self, WatcherHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default per-operation deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// How much of a linked-memory body `get_task_context` inlines.
const CONTEXT_SNIPPET_CHARS: usize = 400;

/// Context assembly depth for [`Service::get_task_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextDepth {
    /// The task plus its linked memories.
    Shallow,
    /// Also subtasks, their memories, and the parent chain summary.
    Deep,
}

impl ContextDepth {
    /// Parse a depth name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shallow" => Some(Self::Shallow),
            "deep" => Some(Self::Deep),
            _ => None,
        }
    }
}

/// A linked memory as returned inside a task context.
#[derive(Debug, Clone, Serialize)]
pub struct ContextMemory {
    /// The memory id.
    pub id: String,
    /// The memory serial.
    pub serial: String,
    /// Connection type that linked it.
    pub connection_type: String,
    /// Link relevance.
    pub relevance: f64,
    /// Title, when set.
    pub title: Option<String>,
    /// Leading body snippet.
    pub snippet: String,
}

/// A subtask with its own linked memories (deep context only).
#[derive(Debug, Clone, Serialize)]
pub struct ContextSubtask {
    /// The subtask.
    pub task: Task,
    /// Its linked memories.
    pub memories: Vec<ContextMemory>,
}

/// The assembled context for one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    /// The task itself.
    pub task: Task,
    /// Memories linked to the task.
    pub memories: Vec<ContextMemory>,
    /// Subtasks with their memories (deep only; empty when shallow).
    pub subtasks: Vec<ContextSubtask>,
    /// Serials of the ancestor chain, nearest first (deep only).
    pub parent_chain: Vec<String>,
}

/// One finding from the health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthIssue {
    /// Stable machine-readable kind.
    pub kind: String,
    /// Human-readable detail.
    pub detail: String,
}

/// Aggregate health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Indexed memory count.
    pub memories: usize,
    /// Indexed task count.
    pub tasks: usize,
    /// Files that failed to parse.
    pub corrupt_files: usize,
    /// Whether periodic backups are overdue.
    pub backup_overdue: bool,
    /// Whether the vector index is live.
    pub semantic_search: bool,
    /// Individual findings (orphans, foreign files, drift).
    pub issues: Vec<HealthIssue>,
}

impl HealthReport {
    /// Whether nothing needs attention.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.corrupt_files == 0 && !self.backup_overdue && self.issues.is_empty()
    }
}

/// The assembled recall core.
pub struct Service {
    store: Arc<Store>,
    linker: Linker,
    backup: Arc<BackupManager>,
    bus: EventBus,
    vector: Arc<dyn VectorIndex>,
    settings: Settings,
    _watcher: Option<WatcherHandle>,
    _periodic_backup: Option<JoinHandle<()>>,
}

impl Service {
    /// Open the full service over validated roots: scan the store,
    /// probe the vector index, start the watcher and the periodic
    /// backup loop.
    ///
    /// Watcher startup failure degrades (no change events) rather than
    /// failing the open.
    ///
    /// # Errors
    ///
    /// Returns an error when the store scan fails.
    pub async fn open(roots: Roots, settings: Settings) -> Result<Self> {
        let vector = crate::vector::open(&settings, &roots).await;
        let store = Arc::new(Store::open(roots.clone()).await?);
        let bus = EventBus::new(DEFAULT_BUS_CAPACITY);

        let watcher = match watch::spawn(roots.clone(), bus.clone(), store.index_handle()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "filesystem watcher unavailable; change events disabled");
                None
            }
        };

        let backup = Arc::new(BackupManager::new(roots, settings.clone()));
        let periodic_backup = backup.spawn_periodic();

        Ok(Self {
            store,
            linker: Linker::new(Arc::clone(&vector)),
            backup,
            bus,
            vector,
            settings,
            _watcher: watcher,
            _periodic_backup: periodic_backup,
        })
    }

    /// The settings this service was opened with.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Direct store access (used by tests and embedding callers).
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The backup manager.
    #[must_use]
    pub fn backup(&self) -> &BackupManager {
        &self.backup
    }

    /// Subscribe to change events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Flush coalesced writes; call before shutdown.
    ///
    /// # Errors
    ///
    /// Returns the first flush failure.
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    // ===== Memories =====

    /// Create a memory and index its embedding.
    ///
    /// # Errors
    ///
    /// See [`Store::create_memory`]; vector failures degrade silently.
    pub async fn add_memory(&self, new: NewMemory) -> Result<Memory> {
        let memory = self.store.create_memory(new).await?;

        if self.vector.is_enabled() {
            let text = embedding_text(&memory);
            match self.vector.embed(&text).await {
                Ok(vector) => {
                    if let Err(e) = self.vector.upsert(memory.id.as_str(), vector).await {
                        tracing::warn!(id = %memory.id, error = %e, "vector upsert failed");
                    }
                }
                Err(e) => tracing::warn!(id = %memory.id, error = %e, "embedding failed"),
            }
        }
        Ok(memory)
    }

    /// Fetch a memory, bumping access counters.
    ///
    /// # Errors
    ///
    /// See [`Store::get_memory`].
    pub async fn get_memory(&self, id: &MemoryId) -> Result<Memory> {
        self.store.get_memory(id).await
    }

    /// The raw text of a memory file (for corrupt entities).
    ///
    /// # Errors
    ///
    /// See [`Store::get_memory_raw`].
    pub async fn get_memory_raw(&self, id: &MemoryId) -> Result<String> {
        self.store.get_memory_raw(id).await
    }

    /// List memories, most recent first.
    ///
    /// # Errors
    ///
    /// See [`Store::list_memories`].
    pub async fn list_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        self.store.list_memories(filter).await
    }

    /// Search memories (best-effort under the default deadline).
    ///
    /// # Errors
    ///
    /// See [`Store::search_memories`].
    pub async fn search_memories(
        &self,
        query: &str,
        filter: &MemoryFilter,
    ) -> Result<Vec<Memory>> {
        let deadline = Instant::now() + DEFAULT_DEADLINE;
        self.store
            .search_memories(query, filter, Some(deadline))
            .await
    }

    /// Update a memory.
    ///
    /// # Errors
    ///
    /// See [`Store::update_memory`].
    pub async fn update_memory(&self, id: &MemoryId, patch: MemoryUpdate) -> Result<Memory> {
        let memory = self.store.update_memory(id, patch).await?;
        if self.vector.is_enabled() {
            if let Ok(vector) = self.vector.embed(&embedding_text(&memory)).await {
                let _ = self.vector.upsert(memory.id.as_str(), vector).await;
            }
        }
        Ok(memory)
    }

    /// Delete a memory: pre-mutation snapshot, cascade removal of its
    /// connections, vector eviction. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`Store::delete_memory`]; snapshot failures propagate (the
    /// delete is not attempted without one).
    pub async fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        self.store.flush().await?;
        {
            // Writers are excluded while the snapshot copies the trees.
            let _quiesced = self.store.quiesce().await;
            self.backup.snapshot("pre-delete-memory").await?;
        }

        let deleted = self.store.delete_memory(id).await?;
        if deleted {
            if let Err(e) = self.vector.remove(id.as_str()).await {
                tracing::warn!(%id, error = %e, "vector eviction failed");
            }
        }
        Ok(deleted)
    }

    // ===== Tasks =====

    /// Create a task; when `auto_link` (the default), run the linker
    /// before returning so the result carries resolved connections.
    ///
    /// # Errors
    ///
    /// See [`Store::create_task`]; linker timeouts surface as
    /// `Timeout` after the task itself has been created.
    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        let auto_link = new.auto_link.unwrap_or(true);
        let has_manual = !new.manual_memories.is_empty();
        let task = self.store.create_task(new).await?;

        if auto_link || has_manual {
            let deadline = Instant::now() + DEFAULT_DEADLINE;
            return self
                .linker
                .link_task(&self.store, &task, auto_link, Some(deadline))
                .await;
        }
        Ok(task)
    }

    /// Fetch a task by id or serial.
    ///
    /// # Errors
    ///
    /// `NotFound` when the reference resolves to nothing.
    pub async fn get_task(&self, reference: &str) -> Result<Task> {
        let id = self
            .store
            .lookup_task_id(reference)
            .await
            .ok_or_else(|| Error::task_not_found(reference))?;
        self.store.get_task(&id).await
    }

    /// List tasks, most recently created first.
    ///
    /// # Errors
    ///
    /// See [`Store::list_tasks`].
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.store.list_tasks(filter).await
    }

    /// Update a task; mutations touching linker inputs re-run the
    /// auto-linker.
    ///
    /// # Errors
    ///
    /// See [`Store::update_task`].
    pub async fn update_task(&self, id: &TaskId, patch: TaskUpdate) -> Result<Task> {
        let relink = patch.affects_linking();
        let task = self.store.update_task(id, patch).await?;

        if relink {
            let deadline = Instant::now() + DEFAULT_DEADLINE;
            return self
                .linker
                .link_task(&self.store, &task, true, Some(deadline))
                .await;
        }
        Ok(task)
    }

    /// Delete a task with full cascade after a pre-mutation snapshot.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// See [`Store::delete_task`].
    pub async fn delete_task(&self, id: &TaskId) -> Result<bool> {
        self.store.flush().await?;
        {
            let _quiesced = self.store.quiesce().await;
            self.backup.snapshot("pre-delete-task").await?;
        }
        self.store.delete_task(id).await
    }

    /// Assemble a task's context: the task, its linked memories, and
    /// (deep) subtasks with theirs plus the ancestor chain.
    ///
    /// # Errors
    ///
    /// `NotFound` when the task does not exist.
    pub async fn get_task_context(
        &self,
        reference: &str,
        depth: ContextDepth,
    ) -> Result<TaskContext> {
        let task = self.get_task(reference).await?;
        let memories = self.context_memories(&task).await;

        let mut subtasks = Vec::new();
        let mut parent_chain = Vec::new();
        if depth == ContextDepth::Deep {
            for subtask_id in &task.subtasks {
                match self.store.get_task(subtask_id).await {
                    Ok(subtask) => {
                        let memories = self.context_memories(&subtask).await;
                        subtasks.push(ContextSubtask {
                            task: subtask,
                            memories,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(subtask = %subtask_id, error = %e, "skipping unreadable subtask");
                    }
                }
            }

            let mut cursor = task.parent_task.clone();
            // Bounded walk in case of on-disk parent loops.
            for _ in 0..64 {
                let Some(parent_id) = cursor else { break };
                match self.store.get_task(&parent_id).await {
                    Ok(parent) => {
                        parent_chain.push(parent.serial.clone());
                        cursor = parent.parent_task;
                    }
                    Err(_) => break,
                }
            }
        }

        Ok(TaskContext {
            task,
            memories,
            subtasks,
            parent_chain,
        })
    }

    async fn context_memories(&self, task: &Task) -> Vec<ContextMemory> {
        let mut memories = Vec::with_capacity(task.memory_connections.len());
        for connection in &task.memory_connections {
            match self.store.get_memory(&connection.memory_id).await {
                Ok(memory) => {
                    let snippet: String = memory.body.chars().take(CONTEXT_SNIPPET_CHARS).collect();
                    memories.push(ContextMemory {
                        id: memory.id.to_string(),
                        serial: memory.serial,
                        connection_type: connection.connection_type.to_string(),
                        relevance: connection.relevance,
                        title: memory.title,
                        snippet,
                    });
                }
                Err(e) => {
                    tracing::debug!(memory = %connection.memory_id, error = %e, "dangling connection");
                }
            }
        }
        memories
    }

    // ===== Integrity =====

    /// Run the health check: counts, corrupt files, foreign files,
    /// index-vs-disk drift, orphaned connections and backup freshness.
    ///
    /// # Errors
    ///
    /// Returns an error only when the roots cannot be walked.
    pub async fn health_check(&self) -> Result<HealthReport> {
        let mut issues = Vec::new();

        let (memories, tasks, corrupt): (usize, usize, Vec<CorruptFile>) = {
            let index = self.store.index.read().await;
            (
                index.memories.len(),
                index.tasks.len(),
                index.corrupt.clone(),
            )
        };
        for file in &corrupt {
            issues.push(HealthIssue {
                kind: "corrupt_file".to_string(),
                detail: format!("{}: {}", file.path.display(), file.reason),
            });
        }

        self.check_foreign_files(&mut issues).await?;
        self.check_drift(&mut issues).await?;
        self.check_orphans(&mut issues).await;

        let backup_overdue = self.backup.is_overdue().await.unwrap_or(true);

        Ok(HealthReport {
            memories,
            tasks,
            corrupt_files: corrupt.len(),
            backup_overdue,
            semantic_search: self.vector.is_enabled(),
            issues,
        })
    }

    async fn check_foreign_files(&self, issues: &mut Vec<HealthIssue>) -> Result<()> {
        for root in [&self.store.roots().memories, &self.store.roots().tasks] {
            let mut projects = match tokio::fs::read_dir(root).await {
                Ok(dir) => dir,
                Err(_) => continue,
            };
            while let Some(project) = projects.next_entry().await? {
                if !project.file_type().await?.is_dir() {
                    issues.push(HealthIssue {
                        kind: "foreign_file".to_string(),
                        detail: project.path().display().to_string(),
                    });
                    continue;
                }
                let mut entries = tokio::fs::read_dir(project.path()).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    let is_md = path.extension().is_some_and(|ext| ext == "md");
                    let is_tmp = path.extension().is_some_and(|ext| ext == "tmp");
                    if !is_md && !is_tmp {
                        issues.push(HealthIssue {
                            kind: "foreign_file".to_string(),
                            detail: path.display().to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    async fn check_drift(&self, issues: &mut Vec<HealthIssue>) -> Result<()> {
        let index = self.store.index.read().await;
        for slot in index.memories.values() {
            if !slot.file.exists() && self.store.guard.writes.pending_contents(&slot.file).is_none()
            {
                issues.push(HealthIssue {
                    kind: "index_drift".to_string(),
                    detail: format!("indexed memory file missing: {}", slot.file.display()),
                });
            }
        }
        for slot in index.tasks.values() {
            if !slot.file.exists() && self.store.guard.writes.pending_contents(&slot.file).is_none()
            {
                issues.push(HealthIssue {
                    kind: "index_drift".to_string(),
                    detail: format!("indexed task file missing: {}", slot.file.display()),
                });
            }
        }
        Ok(())
    }

    async fn check_orphans(&self, issues: &mut Vec<HealthIssue>) {
        let (task_ids, memory_ids) = {
            let index = self.store.index.read().await;
            (
                index.tasks.keys().cloned().collect::<Vec<_>>(),
                index.memories.keys().cloned().collect::<std::collections::HashSet<_>>(),
            )
        };

        for task_id in task_ids {
            let Ok(task) = self.store.get_task(&task_id).await else {
                continue;
            };
            for connection in &task.memory_connections {
                if !memory_ids.contains(&connection.memory_id) {
                    issues.push(HealthIssue {
                        kind: "orphaned_connection".to_string(),
                        detail: format!(
                            "task {} links missing memory {}",
                            task.id, connection.memory_id
                        ),
                    });
                }
            }
        }
    }

    /// Take an emergency backup; called on unexpected internal errors
    /// before they surface.
    pub async fn emergency_backup(&self, context: &str) {
        self.backup.emergency(context).await;
    }
}

fn embedding_text(memory: &Memory) -> String {
    let mut text = String::new();
    if let Some(title) = &memory.title {
        text.push_str(title);
        text.push(' ');
    }
    text.push_str(&memory.body);
    for tag in &memory.tags {
        text.push(' ');
        text.push_str(tag);
    }
    text
}
