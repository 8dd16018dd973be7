//! Memory CRUD and search on the [`Store`].

use super::{slug, Store};
use crate::domain::{
    derive_complexity, derive_content_type, has_mermaid_diagram, now_secs, Memory, MemoryFilter,
    MemoryId, MemoryMetadata, MemoryUpdate, NewMemory,
};
use crate::error::{Error, Result};
use crate::paths::sanitize_project;
use recall_markdown::write_atomic;
use std::path::PathBuf;
use tokio::time::Instant;

const FILENAME_RETRIES: u32 = 3;

impl Store {
    /// Create a new memory.
    ///
    /// Derives complexity and content metadata, assigns the id and
    /// serial, and writes the file through the atomic path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on validation failure, `AlreadyExists`
    /// when filename collisions persist after retries, and `IOError`
    /// variants on disk failure.
    pub async fn create_memory(&self, new: NewMemory) -> Result<Memory> {
        new.validate().map_err(|reason| Error::invalid("memory", reason))?;

        let project = sanitize_project(new.project.as_deref());
        let project_dir = self.roots().memory_project_dir(&project)?;
        tokio::fs::create_dir_all(&project_dir).await?;

        let id = {
            let mut generator = self
                .memory_id_gen
                .lock()
                .expect("id generator mutex poisoned");
            generator
                .generate(&new.content)
                .map_err(Error::Internal)?
        };

        let timestamp = now_secs();
        let mut memory = Memory {
            id: MemoryId::new(id),
            serial: String::new(),
            timestamp,
            complexity: 1,
            category: new.category,
            project,
            tags: new.tags,
            priority: new.priority.unwrap_or_default(),
            status: new.status.unwrap_or_default(),
            related_memories: new.related_memories,
            task_connections: Vec::new(),
            access_count: 0,
            last_accessed: None,
            metadata: MemoryMetadata {
                content_type: derive_content_type(&new.content),
                language: new.language,
                size: new.content.len() as u64,
                mermaid_diagram: has_mermaid_diagram(&new.content),
            },
            title: new.title,
            summary: new.summary,
            body: new.content,
        };
        memory.complexity = derive_complexity(&memory);

        let _root = self.guard.memories_root().read().await;
        let _id_lock = self.guard.lock_id(memory.id.as_str()).await;

        memory.serial = self.index.write().await.next_memory_serial();

        let file = self.place_memory_file(&project_dir, &memory).await?;
        write_atomic(&file, &memory.to_document().render()).await?;

        self.index.write().await.insert_memory(&memory, file);
        tracing::info!(id = %memory.id, serial = %memory.serial, project = %memory.project, "memory created");
        Ok(memory)
    }

    /// Fetch a memory by id, bumping its access counters.
    ///
    /// The counter bump is written back through the coalescing buffer,
    /// so rapid repeated reads cost one disk write.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `Corrupt` when the file on disk no
    /// longer parses (see [`Store::get_memory_raw`]).
    pub async fn get_memory(&self, id: &MemoryId) -> Result<Memory> {
        let file = self.memory_file(id).await?;
        let mut memory = self.load_memory(&file).await?;

        memory.access_count += 1;
        memory.last_accessed = Some(now_secs());
        self.guard
            .writes
            .enqueue(&file, memory.to_document().render());

        Ok(memory)
    }

    /// Fetch a memory without touching its access counters.
    pub(crate) async fn peek_memory(&self, id: &MemoryId) -> Result<Memory> {
        let file = self.memory_file(id).await?;
        self.load_memory(&file).await
    }

    /// The raw file text for a memory, for callers that want the body
    /// of a corrupt entity.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `IOError` when the file is gone.
    pub async fn get_memory_raw(&self, id: &MemoryId) -> Result<String> {
        let file = self.memory_file(id).await?;
        if let Some(pending) = self.guard.writes.pending_contents(&file) {
            return Ok(pending);
        }
        Ok(tokio::fs::read_to_string(&file).await?)
    }

    /// List memories, most recent first.
    pub async fn list_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        let candidates = {
            let index = self.index.read().await;
            let mut slots: Vec<(MemoryId, PathBuf, chrono::DateTime<chrono::Utc>)> = index
                .memory_ids(filter.project.as_deref())
                .into_iter()
                .filter_map(|id| {
                    let slot = index.memories.get(&id)?;
                    if let Some(category) = filter.category {
                        if slot.category != Some(category) {
                            return None;
                        }
                    }
                    if let Some(tag) = &filter.tag {
                        if !slot.tags.contains(tag) {
                            return None;
                        }
                    }
                    Some((id.clone(), slot.file.clone(), slot.timestamp))
                })
                .collect();
            slots.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.as_str().cmp(b.0.as_str())));
            if let Some(limit) = filter.limit {
                slots.truncate(limit);
            }
            slots
        };

        let mut memories = Vec::with_capacity(candidates.len());
        for (id, file, _) in candidates {
            match self.load_memory(&file).await {
                Ok(memory) => memories.push(memory),
                Err(e) => tracing::warn!(%id, error = %e, "skipping unreadable memory in listing"),
            }
        }
        Ok(memories)
    }

    /// Case-insensitive substring search over bodies and titles, exact
    /// tag match, category substring. Best-effort under a deadline:
    /// returns what was found when time runs out.
    pub async fn search_memories(
        &self,
        query: &str,
        filter: &MemoryFilter,
        deadline: Option<Instant>,
    ) -> Result<Vec<Memory>> {
        let needle = query.to_lowercase();
        let candidates = {
            let index = self.index.read().await;
            index
                .memory_ids(filter.project.as_deref())
                .into_iter()
                .filter_map(|id| index.memories.get(&id).map(|s| (id.clone(), s.file.clone())))
                .collect::<Vec<_>>()
        };

        let mut scored: Vec<(u32, Memory)> = Vec::new();
        for (id, file) in candidates {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::debug!("search deadline reached; returning partial results");
                break;
            }
            let memory = match self.load_memory(&file).await {
                Ok(memory) => memory,
                Err(e) => {
                    tracing::warn!(%id, error = %e, "skipping unreadable memory in search");
                    continue;
                }
            };
            let score = match_score(&memory, &needle);
            if score > 0 {
                scored.push((score, memory));
            }
        }

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
                .then_with(|| a.1.id.as_str().cmp(b.1.id.as_str()))
        });
        if let Some(limit) = filter.limit {
            scored.truncate(limit);
        }
        Ok(scored.into_iter().map(|(_, m)| m).collect())
    }

    /// Update a memory. `id` and `timestamp` are immutable; complexity
    /// and content metadata are re-derived when the body changes.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids; `Corrupt` when the current file does
    /// not parse.
    pub async fn update_memory(&self, id: &MemoryId, patch: MemoryUpdate) -> Result<Memory> {
        let _root = self.guard.memories_root().read().await;
        let _id_lock = self.guard.lock_id(id.as_str()).await;

        let file = self.memory_file(id).await?;
        let mut memory = self.load_memory(&file).await?;

        if let Some(content) = patch.content {
            memory.metadata.content_type = derive_content_type(&content);
            memory.metadata.size = content.len() as u64;
            memory.metadata.mermaid_diagram = has_mermaid_diagram(&content);
            memory.body = content;
        }
        if let Some(tags) = patch.tags {
            memory.tags = tags;
        }
        if let Some(category) = patch.category {
            memory.category = category;
        }
        if let Some(priority) = patch.priority {
            memory.priority = priority;
        }
        if let Some(status) = patch.status {
            memory.status = status;
        }
        if let Some(related) = patch.related_memories {
            memory.related_memories = related;
        }
        if let Some(title) = patch.title {
            memory.title = title;
        }
        if let Some(summary) = patch.summary {
            memory.summary = summary;
        }
        memory.complexity = derive_complexity(&memory);

        self.guard
            .writes
            .enqueue(&file, memory.to_document().render());
        self.index.write().await.insert_memory(&memory, file);
        Ok(memory)
    }

    /// Delete a memory and remove every connection referencing it.
    ///
    /// Idempotent: deleting an unknown id returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Surfaces IO failures; referencing tasks that fail to parse are
    /// skipped with a warning (the health check reports the orphans).
    pub async fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        let _root = self.guard.memories_root().read().await;

        let Some(file) = self.try_memory_file(id).await else {
            return Ok(false);
        };

        // Collect the lock set up front, sorted, to keep a global
        // acquisition order with the task-delete cascade.
        let memory = self.load_memory(&file).await?;
        let mut keys: Vec<String> = memory
            .task_connections
            .iter()
            .map(|c| c.task_id.as_str().to_string())
            .collect();
        keys.push(id.as_str().to_string());
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.guard.lock_id(key).await);
        }

        self.guard.writes.discard(&file);
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.index.write().await.remove_memory(id);

        for connection in &memory.task_connections {
            if let Err(e) = self.detach_memory_from_task(&connection.task_id, id).await {
                tracing::warn!(
                    task = %connection.task_id,
                    memory = %id,
                    error = %e,
                    "could not remove mirrored connection; health check will report the orphan"
                );
            }
        }

        tracing::info!(%id, "memory deleted");
        Ok(true)
    }

    /// The on-disk location of a memory, relative to the memories root.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn memory_relative_path(&self, id: &MemoryId) -> Result<String> {
        let file = self.memory_file(id).await?;
        let relative = file.strip_prefix(&self.roots().memories).unwrap_or(&file);
        Ok(relative.to_string_lossy().into_owned())
    }

    /// Resolve a memory id to its file, or `NotFound`.
    pub(crate) async fn memory_file(&self, id: &MemoryId) -> Result<PathBuf> {
        self.try_memory_file(id)
            .await
            .ok_or_else(|| Error::memory_not_found(id.as_str()))
    }

    async fn try_memory_file(&self, id: &MemoryId) -> Option<PathBuf> {
        self.index
            .read()
            .await
            .memories
            .get(id)
            .map(|slot| slot.file.clone())
    }

    /// Choose a collision-free memory filename within the project dir:
    /// `<YYYY-MM-DD>-<slug>-<nnnnnn>.md`.
    async fn place_memory_file(
        &self,
        project_dir: &std::path::Path,
        memory: &Memory,
    ) -> Result<PathBuf> {
        let date = memory.timestamp.format("%Y-%m-%d");
        let slug = slug(&memory.body, "note");

        for _ in 0..FILENAME_RETRIES {
            let candidate =
                project_dir.join(format!("{date}-{slug}-{}.md", self.next_file_suffix()));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(Error::AlreadyExists {
            kind: "memory",
            id: format!("{date}-{slug}"),
        })
    }
}

fn match_score(memory: &Memory, needle: &str) -> u32 {
    let mut score = 0;
    if memory.body.to_lowercase().contains(needle) {
        score += 2;
    }
    if memory
        .title
        .as_ref()
        .is_some_and(|t| t.to_lowercase().contains(needle))
    {
        score += 3;
    }
    if memory.tags.iter().any(|t| t.to_lowercase() == needle) {
        score += 2;
    }
    if memory
        .category
        .is_some_and(|c| c.as_str().contains(needle))
    {
        score += 1;
    }
    score
}
