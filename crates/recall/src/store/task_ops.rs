//! Task CRUD, hierarchy wiring and connection persistence on the
//! [`Store`].
//!
//! Cascades acquire every per-id lock they need up front, in sorted
//! order, so concurrent cascades cannot deadlock against each other.

use super::{slug, Store};
use crate::domain::{
    now_secs, MemoryConnection, MemoryId, NewTask, Task, TaskFilter, TaskId, TaskStatus,
    TaskUpdate,
};
use crate::error::{Error, Result};
use crate::paths::sanitize_project;
use recall_markdown::write_atomic;
use std::collections::HashSet;
use std::path::PathBuf;

impl Store {
    /// Create a new task. Parent references are validated and the
    /// parent's `subtasks` list gains the new id (bidirectionally
    /// consistent with `parent_task`).
    ///
    /// # Errors
    ///
    /// `InvalidInput` on validation failure, `NotFound` when the parent
    /// does not exist.
    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        new.validate().map_err(|reason| Error::invalid("task", reason))?;

        let project = sanitize_project(new.project.as_deref());
        let project_dir = self.roots().task_project_dir(&project)?;
        tokio::fs::create_dir_all(&project_dir).await?;

        if let Some(parent) = &new.parent_task {
            if !self.index.read().await.tasks.contains_key(parent) {
                return Err(Error::task_not_found(parent.as_str()));
            }
        }

        let id = {
            let mut generator = self.task_id_gen.lock().expect("id generator mutex poisoned");
            generator
                .generate(&format!("{}|{}", new.title, new.description))
                .map_err(Error::Internal)?
        };
        let id = TaskId::new(id);

        let _root = self.guard.tasks_root().read().await;
        let _locks = self
            .lock_sorted(
                std::iter::once(id.as_str().to_string())
                    .chain(new.parent_task.iter().map(|p| p.as_str().to_string())),
            )
            .await;

        let serial = self.index.write().await.next_task_serial();
        let now = now_secs();
        let task = Task {
            id: id.clone(),
            serial: serial.clone(),
            title: new.title.trim().to_string(),
            description: new.description,
            project,
            category: new.category,
            priority: new.priority.unwrap_or_default(),
            status: TaskStatus::Todo,
            parent_task: new.parent_task.clone(),
            subtasks: Vec::new(),
            tags: new.tags,
            memory_connections: Vec::new(),
            manual_memories: new.manual_memories,
            created: now,
            updated: now,
            completed: None,
        };

        let file = project_dir.join(format!("{serial}-{}.md", slug(&task.title, "task")));
        write_atomic(&file, &task.to_document().render()).await?;
        self.index.write().await.insert_task(&task, file);

        if let Some(parent) = &new.parent_task {
            self.add_subtask_to_parent(parent, &id).await?;
        }

        tracing::info!(id = %task.id, serial = %task.serial, project = %task.project, "task created");
        Ok(task)
    }

    /// Fetch a task by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `Corrupt` when the file on disk no
    /// longer parses.
    pub async fn get_task(&self, id: &TaskId) -> Result<Task> {
        let file = self.task_file(id).await?;
        self.load_task(&file).await
    }

    /// Resolve an id-or-serial reference to a task id. Serials are
    /// display-only but accepted on input for convenience.
    pub async fn lookup_task_id(&self, reference: &str) -> Option<TaskId> {
        let index = self.index.read().await;
        let as_id = TaskId::new(reference);
        if index.tasks.contains_key(&as_id) {
            return Some(as_id);
        }
        index.task_by_serial.get(reference).cloned()
    }

    /// List tasks, most recently created first.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let candidates = {
            let index = self.index.read().await;
            let mut slots: Vec<(u64, TaskId, PathBuf)> = index
                .task_ids(filter.project.as_deref(), filter.status)
                .into_iter()
                .filter_map(|id| {
                    index
                        .tasks
                        .get(&id)
                        .map(|slot| (slot.serial_number, id.clone(), slot.file.clone()))
                })
                .collect();
            slots.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
            if let Some(limit) = filter.limit {
                slots.truncate(limit);
            }
            slots
        };

        let mut tasks = Vec::with_capacity(candidates.len());
        for (_, id, file) in candidates {
            match self.load_task(&file).await {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(%id, error = %e, "skipping unreadable task in listing"),
            }
        }
        Ok(tasks)
    }

    /// Update a task: patch merge, status-transition validation,
    /// parent rewiring with cycle rejection, and project relocation.
    ///
    /// # Errors
    ///
    /// `Conflict` on an illegal status transition (state unchanged),
    /// `InvalidInput` when re-parenting would create a cycle,
    /// `NotFound` for unknown ids or parents.
    pub async fn update_task(&self, id: &TaskId, patch: TaskUpdate) -> Result<Task> {
        let _root = self.guard.tasks_root().read().await;

        // Collect the lock set: the task, its current parent and the
        // prospective parent all get rewritten.
        let preview = self.load_task(&self.task_file(id).await?).await?;
        let mut keys: Vec<String> = vec![id.as_str().to_string()];
        if let Some(parent) = &preview.parent_task {
            keys.push(parent.as_str().to_string());
        }
        if let Some(Some(parent)) = &patch.parent_task {
            keys.push(parent.as_str().to_string());
        }
        let _locks = self.lock_sorted(keys.into_iter()).await;

        let old_file = self.task_file(id).await?;
        let mut task = self.load_task(&old_file).await?;

        if let Some(to) = patch.status {
            if !task.status.can_transition(to) {
                return Err(Error::Conflict {
                    from: task.status.to_string(),
                    to: to.to_string(),
                });
            }
            if to == TaskStatus::Done && task.completed.is_none() {
                // One-shot completion stamp: reopen cycles never
                // clear or re-stamp it.
                task.completed = Some(now_secs());
            }
            task.status = to;
        }

        if let Some(new_parent) = patch.parent_task.clone() {
            self.rewire_parent(&mut task, new_parent).await?;
        }

        if let Some(title) = patch.title {
            let trimmed = title.trim().to_string();
            if trimmed.is_empty() {
                return Err(Error::invalid("title", "Title cannot be empty"));
            }
            task.title = trimmed;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }
        if let Some(manual) = patch.manual_memories {
            task.manual_memories = manual;
        }

        let file = if let Some(project) = patch.project {
            let project = sanitize_project(Some(&project));
            if project == task.project {
                old_file.clone()
            } else {
                task.project = project;
                self.relocate_task_file(&old_file, &task).await?
            }
        } else {
            old_file.clone()
        };

        task.updated = now_secs();
        self.guard.writes.enqueue(&file, task.to_document().render());
        self.index.write().await.insert_task(&task, file);
        Ok(task)
    }

    /// Delete a task, cascading: the parent loses the subtask entry,
    /// subtasks are detached (`parent_task = null`), and every linked
    /// memory loses its mirrored connection.
    ///
    /// Idempotent: deleting an unknown id returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Surfaces IO failures on the task file itself; cascade targets
    /// that fail are logged and left to the health check.
    pub async fn delete_task(&self, id: &TaskId) -> Result<bool> {
        let _root = self.guard.tasks_root().read().await;

        let Some(file) = self.try_task_file(id).await else {
            return Ok(false);
        };
        let task = self.load_task(&file).await?;

        let mut keys: Vec<String> = vec![id.as_str().to_string()];
        keys.extend(task.parent_task.iter().map(|p| p.as_str().to_string()));
        keys.extend(task.subtasks.iter().map(|s| s.as_str().to_string()));
        keys.extend(
            task.memory_connections
                .iter()
                .map(|c| c.memory_id.as_str().to_string()),
        );
        let _locks = self.lock_sorted(keys.into_iter()).await;

        self.guard.writes.discard(&file);
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.index.write().await.remove_task(id);

        if let Some(parent) = &task.parent_task {
            if let Err(e) = self.remove_subtask_from_parent(parent, id).await {
                tracing::warn!(parent = %parent, error = %e, "could not update parent subtask list");
            }
        }
        for subtask in &task.subtasks {
            if let Err(e) = self.detach_parent(subtask).await {
                tracing::warn!(subtask = %subtask, error = %e, "could not detach subtask");
            }
        }
        for connection in &task.memory_connections {
            if let Err(e) = self
                .remove_task_connection(&connection.memory_id, id)
                .await
            {
                tracing::warn!(
                    memory = %connection.memory_id,
                    error = %e,
                    "could not remove mirrored connection; health check will report the orphan"
                );
            }
        }

        tracing::info!(%id, "task deleted");
        Ok(true)
    }

    /// Replace a task's memory connections and mirror the change onto
    /// every affected memory. Called by the auto-linker with the merged
    /// manual + auto set.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown tasks; memory-side failures are logged
    /// and skipped (health check reports resulting orphans).
    pub async fn set_task_connections(
        &self,
        id: &TaskId,
        connections: Vec<MemoryConnection>,
    ) -> Result<Task> {
        let _root = self.guard.tasks_root().read().await;

        let file = self.task_file(id).await?;
        let preview = self.load_task(&file).await?;

        let mut keys: HashSet<String> = HashSet::new();
        keys.insert(id.as_str().to_string());
        for connection in preview.memory_connections.iter().chain(connections.iter()) {
            keys.insert(connection.memory_id.as_str().to_string());
        }
        let _locks = self.lock_sorted(keys.into_iter()).await;

        let mut task = self.load_task(&file).await?;
        let old: HashSet<MemoryId> = task
            .memory_connections
            .iter()
            .map(|c| c.memory_id.clone())
            .collect();
        let new_ids: HashSet<MemoryId> =
            connections.iter().map(|c| c.memory_id.clone()).collect();

        task.memory_connections = connections.clone();
        task.updated = now_secs();
        write_atomic(&file, &task.to_document().render()).await?;

        for removed in old.difference(&new_ids) {
            if let Err(e) = self.remove_task_connection(removed, id).await {
                tracing::warn!(memory = %removed, error = %e, "could not remove mirrored connection");
            }
        }
        for connection in &connections {
            if let Err(e) = self.upsert_task_connection(connection, &task).await {
                tracing::warn!(
                    memory = %connection.memory_id,
                    error = %e,
                    "could not mirror connection onto memory"
                );
            }
        }
        Ok(task)
    }

    // ===== Cascade helpers (callers hold the relevant per-id locks) =====

    pub(crate) async fn detach_memory_from_task(
        &self,
        task_id: &TaskId,
        memory_id: &MemoryId,
    ) -> Result<()> {
        let file = self.task_file(task_id).await?;
        let mut task = self.load_task(&file).await?;
        task.memory_connections
            .retain(|c| &c.memory_id != memory_id);
        task.manual_memories.retain(|m| m != memory_id);
        task.updated = now_secs();
        write_atomic(&file, &task.to_document().render()).await?;
        self.index.write().await.insert_task(&task, file);
        Ok(())
    }

    async fn remove_task_connection(&self, memory_id: &MemoryId, task_id: &TaskId) -> Result<()> {
        let file = self.memory_file(memory_id).await?;
        let mut memory = self.load_memory(&file).await?;
        let before = memory.task_connections.len();
        memory.task_connections.retain(|c| &c.task_id != task_id);
        if memory.task_connections.len() != before {
            write_atomic(&file, &memory.to_document().render()).await?;
        }
        Ok(())
    }

    async fn upsert_task_connection(
        &self,
        connection: &MemoryConnection,
        task: &Task,
    ) -> Result<()> {
        let file = self.memory_file(&connection.memory_id).await?;
        let mut memory = self.load_memory(&file).await?;

        let existing = memory
            .task_connections
            .iter_mut()
            .find(|c| c.task_id == task.id);
        match existing {
            Some(mirror) => {
                if mirror.connection_type == connection.connection_type {
                    return Ok(());
                }
                mirror.connection_type = connection.connection_type;
            }
            None => memory.task_connections.push(crate::domain::TaskConnection {
                task_id: task.id.clone(),
                task_serial: task.serial.clone(),
                connection_type: connection.connection_type,
                created: now_secs(),
            }),
        }
        write_atomic(&file, &memory.to_document().render()).await?;
        Ok(())
    }

    async fn add_subtask_to_parent(&self, parent: &TaskId, child: &TaskId) -> Result<()> {
        let file = self.task_file(parent).await?;
        let mut task = self.load_task(&file).await?;
        if !task.subtasks.contains(child) {
            task.subtasks.push(child.clone());
            task.updated = now_secs();
            write_atomic(&file, &task.to_document().render()).await?;
            self.index.write().await.insert_task(&task, file);
        }
        Ok(())
    }

    async fn remove_subtask_from_parent(&self, parent: &TaskId, child: &TaskId) -> Result<()> {
        let file = self.task_file(parent).await?;
        let mut task = self.load_task(&file).await?;
        let before = task.subtasks.len();
        task.subtasks.retain(|s| s != child);
        if task.subtasks.len() != before {
            task.updated = now_secs();
            write_atomic(&file, &task.to_document().render()).await?;
            self.index.write().await.insert_task(&task, file);
        }
        Ok(())
    }

    async fn detach_parent(&self, id: &TaskId) -> Result<()> {
        let file = self.task_file(id).await?;
        let mut task = self.load_task(&file).await?;
        if task.parent_task.is_some() {
            task.parent_task = None;
            task.updated = now_secs();
            write_atomic(&file, &task.to_document().render()).await?;
            self.index.write().await.insert_task(&task, file);
        }
        Ok(())
    }

    async fn rewire_parent(&self, task: &mut Task, new_parent: Option<TaskId>) -> Result<()> {
        if task.parent_task == new_parent {
            return Ok(());
        }

        if let Some(parent) = &new_parent {
            if !self.index.read().await.tasks.contains_key(parent) {
                return Err(Error::task_not_found(parent.as_str()));
            }
            if self
                .index
                .write()
                .await
                .would_create_cycle(&task.id, parent)
            {
                return Err(Error::invalid(
                    "parent_task",
                    format!("making {} a child of {parent} would create a cycle", task.id),
                ));
            }
        }

        if let Some(old_parent) = task.parent_task.clone() {
            self.remove_subtask_from_parent(&old_parent, &task.id).await?;
        }
        if let Some(parent) = &new_parent {
            self.add_subtask_to_parent(parent, &task.id).await?;
        }
        task.parent_task = new_parent;
        Ok(())
    }

    async fn relocate_task_file(&self, old_file: &PathBuf, task: &Task) -> Result<PathBuf> {
        let project_dir = self.roots().task_project_dir(&task.project)?;
        tokio::fs::create_dir_all(&project_dir).await?;
        let new_file = project_dir.join(format!(
            "{}-{}.md",
            task.serial,
            slug(&task.title, "task")
        ));

        // The new location is committed before the old file goes away,
        // so a crash in between leaves a duplicate, never a loss.
        write_atomic(&new_file, &task.to_document().render()).await?;
        self.guard.writes.discard(old_file);
        match tokio::fs::remove_file(old_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(new_file)
    }

    pub(crate) async fn task_file(&self, id: &TaskId) -> Result<PathBuf> {
        self.try_task_file(id)
            .await
            .ok_or_else(|| Error::task_not_found(id.as_str()))
    }

    async fn try_task_file(&self, id: &TaskId) -> Option<PathBuf> {
        self.index
            .read()
            .await
            .tasks
            .get(id)
            .map(|slot| slot.file.clone())
    }

    /// Acquire per-id locks for all keys in sorted order (deadlock-free
    /// with every other cascade doing the same).
    async fn lock_sorted(
        &self,
        keys: impl Iterator<Item = String>,
    ) -> Vec<super::guard::IdGuard> {
        let mut keys: Vec<String> = keys.collect();
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.guard.lock_id(key).await);
        }
        guards
    }
}
