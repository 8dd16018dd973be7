//! MCP tool implementations.
//!
//! Thin async adapters from validated MCP parameters onto the recall
//! service. Every operation runs under the gateway deadline; on expiry
//! the call returns `Timeout` and any uncommitted temp-file writes are
//! discarded by the store.

use crate::error::{Error, Result};
use crate::models::{
    parse_memory_category, parse_memory_priority, parse_memory_status, parse_task_category,
    parse_task_priority, parse_task_status, AddMemoryParams, AddMemoryResponse, CreateTaskParams,
    DeleteResponse, ListMemoriesParams, ListTasksParams, McpMemory, McpTask, McpTaskContext,
    SearchMemoriesParams, TestToolParams, TestToolResponse, UpdateTaskParams,
};
use recall::domain::{
    MemoryFilter, MemoryId, MemoryUpdate, NewMemory, NewTask, TaskFilter, TaskId, TaskUpdate,
};
use recall::service::ContextDepth;
use recall::Service;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Gateway-side deadline for every operation.
pub const OPERATION_DEADLINE: Duration = Duration::from_secs(30);

/// Tool implementations for the recall MCP gateway.
pub struct Tools {
    service: Arc<Service>,
}

impl Tools {
    /// Create a new Tools instance over the running service.
    #[must_use]
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    async fn deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(OPERATION_DEADLINE, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                // Unexpected internal failures get an emergency backup
                // before they surface.
                if matches!(&e, Error::Core(recall::Error::Internal(_))) {
                    self.service.emergency_backup(operation).await;
                }
                Err(e)
            }
            Err(_) => Err(Error::Timeout(operation)),
        }
    }

    /// Create a memory.
    ///
    /// # Errors
    ///
    /// Invalid enum arguments, store validation failures.
    pub async fn add_memory(&self, params: AddMemoryParams) -> Result<AddMemoryResponse> {
        let new = NewMemory {
            content: params.content,
            tags: params.tags.unwrap_or_default(),
            category: params
                .category
                .as_deref()
                .map(parse_memory_category)
                .transpose()?,
            project: params.project,
            priority: params
                .priority
                .as_deref()
                .map(parse_memory_priority)
                .transpose()?,
            status: params
                .status
                .as_deref()
                .map(parse_memory_status)
                .transpose()?,
            related_memories: params
                .related_memories
                .unwrap_or_default()
                .into_iter()
                .map(MemoryId::new)
                .collect(),
            language: params.language,
            title: params.title,
            summary: params.summary,
        };

        self.deadline("add_memory", async {
            let memory = self.service.add_memory(new).await?;
            let file = self
                .service
                .store()
                .memory_relative_path(&memory.id)
                .await?;
            Ok(AddMemoryResponse {
                id: memory.id.to_string(),
                serial: memory.serial.clone(),
                file,
                complexity: memory.complexity,
                content_type: memory.metadata.content_type.as_str().to_string(),
            })
        })
        .await
    }

    /// Fetch a full memory record.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids; `Corrupt` files fall back to a raw
    /// body record.
    pub async fn get_memory(&self, id: &str) -> Result<McpMemory> {
        self.deadline("get_memory", async {
            let memory_id = MemoryId::new(id);
            match self.service.get_memory(&memory_id).await {
                Ok(memory) => Ok(memory.into()),
                Err(recall::Error::Corrupt { file, reason }) => {
                    // Explicit gets may still see the raw body of a
                    // corrupt entity.
                    tracing::warn!(%id, %reason, "returning raw body for corrupt memory");
                    let raw = self.service.get_memory_raw(&memory_id).await?;
                    Ok(McpMemory {
                        id: id.to_string(),
                        serial: String::new(),
                        timestamp: String::new(),
                        complexity: 1,
                        category: None,
                        project: file
                            .parent()
                            .and_then(|p| p.file_name())
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        tags: Vec::new(),
                        priority: "medium".to_string(),
                        status: "active".to_string(),
                        related_memories: Vec::new(),
                        task_connections: Vec::new(),
                        access_count: 0,
                        last_accessed: None,
                        content_type: "text".to_string(),
                        language: None,
                        size: raw.len() as u64,
                        mermaid_diagram: false,
                        title: None,
                        summary: None,
                        content: raw,
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// List memories, most recent first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_memories(&self, params: ListMemoriesParams) -> Result<Vec<McpMemory>> {
        let filter = MemoryFilter {
            project: params.project,
            limit: params.limit,
            ..Default::default()
        };
        self.deadline("list_memories", async {
            let memories = self.service.list_memories(&filter).await?;
            Ok(memories.into_iter().map(Into::into).collect())
        })
        .await
    }

    /// Search memories, ranked.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn search_memories(&self, params: SearchMemoriesParams) -> Result<Vec<McpMemory>> {
        let filter = MemoryFilter {
            project: params.project,
            ..Default::default()
        };
        self.deadline("search_memories", async {
            let memories = self.service.search_memories(&params.query, &filter).await?;
            Ok(memories.into_iter().map(Into::into).collect())
        })
        .await
    }

    /// Delete a memory (idempotent).
    ///
    /// # Errors
    ///
    /// Backup or IO failures.
    pub async fn delete_memory(&self, id: &str) -> Result<DeleteResponse> {
        self.deadline("delete_memory", async {
            let deleted = self.service.delete_memory(&MemoryId::new(id)).await?;
            Ok(DeleteResponse {
                id: id.to_string(),
                deleted,
            })
        })
        .await
    }

    /// Create a task (auto-linking by default).
    ///
    /// # Errors
    ///
    /// Invalid enum arguments, missing parent, store failures.
    pub async fn create_task(&self, params: CreateTaskParams) -> Result<McpTask> {
        let new = NewTask {
            title: params.title,
            description: params.description.unwrap_or_default(),
            project: params.project,
            category: params
                .category
                .as_deref()
                .map(parse_task_category)
                .transpose()?,
            priority: params
                .priority
                .as_deref()
                .map(parse_task_priority)
                .transpose()?,
            parent_task: params.parent_task.map(TaskId::new),
            tags: params.tags.unwrap_or_default(),
            auto_link: params.auto_link,
            manual_memories: params
                .manual_memories
                .unwrap_or_default()
                .into_iter()
                .map(MemoryId::new)
                .collect(),
        };

        self.deadline("create_task", async {
            Ok(self.service.create_task(new).await?.into())
        })
        .await
    }

    /// Update a task.
    ///
    /// Clearable string fields use the empty string to clear:
    /// `category: ""` removes the category, `parent_task: ""` detaches.
    ///
    /// # Errors
    ///
    /// Illegal status transitions (`Conflict`), invalid enums, cycles.
    pub async fn update_task(&self, params: UpdateTaskParams) -> Result<McpTask> {
        let patch = TaskUpdate {
            title: params.title,
            description: params.description,
            status: params
                .status
                .as_deref()
                .map(parse_task_status)
                .transpose()?,
            priority: params
                .priority
                .as_deref()
                .map(parse_task_priority)
                .transpose()?,
            category: match params.category.as_deref() {
                None => None,
                Some("") => Some(None),
                Some(raw) => Some(Some(parse_task_category(raw)?)),
            },
            tags: params.tags,
            project: params.project,
            parent_task: match params.parent_task.as_deref() {
                None => None,
                Some("") => Some(None),
                Some(raw) => Some(Some(TaskId::new(raw))),
            },
            manual_memories: params
                .manual_memories
                .map(|ids| ids.into_iter().map(MemoryId::new).collect()),
        };

        let id = TaskId::new(params.id);
        self.deadline("update_task", async {
            Ok(self.service.update_task(&id, patch).await?.into())
        })
        .await
    }

    /// List tasks, most recently created first.
    ///
    /// # Errors
    ///
    /// Invalid status argument, store failures.
    pub async fn list_tasks(&self, params: ListTasksParams) -> Result<Vec<McpTask>> {
        let filter = TaskFilter {
            project: params.project,
            status: params
                .status
                .as_deref()
                .map(parse_task_status)
                .transpose()?,
            limit: params.limit,
        };
        self.deadline("list_tasks", async {
            let tasks = self.service.list_tasks(&filter).await?;
            Ok(tasks.into_iter().map(Into::into).collect())
        })
        .await
    }

    /// Assemble a task's context.
    ///
    /// # Errors
    ///
    /// Invalid depth argument, `NotFound`.
    pub async fn get_task_context(
        &self,
        id: &str,
        depth: Option<&str>,
    ) -> Result<McpTaskContext> {
        let depth = match depth {
            None => ContextDepth::Shallow,
            Some(raw) => ContextDepth::parse(raw).ok_or_else(|| Error::InvalidArgument {
                field: "depth",
                value: raw.to_string(),
                valid_values: "shallow, deep",
            })?,
        };
        self.deadline("get_task_context", async {
            Ok(self.service.get_task_context(id, depth).await?.into())
        })
        .await
    }

    /// Delete a task with cascade (idempotent).
    ///
    /// # Errors
    ///
    /// Backup or IO failures.
    pub async fn delete_task(&self, id: &str) -> Result<DeleteResponse> {
        self.deadline("delete_task", async {
            let deleted = self.service.delete_task(&TaskId::new(id)).await?;
            Ok(DeleteResponse {
                id: id.to_string(),
                deleted,
            })
        })
        .await
    }

    /// Echo, for liveness probes.
    ///
    /// # Errors
    ///
    /// This function does not currently return errors but returns
    /// `Result` for API consistency.
    pub async fn test_tool(&self, params: TestToolParams) -> Result<TestToolResponse> {
        let health = self.service.health_check().await.ok();
        Ok(TestToolResponse {
            echo: params.message,
            version: env!("CARGO_PKG_VERSION").to_string(),
            semantic_search: health.is_some_and(|h| h.semantic_search),
        })
    }
}
