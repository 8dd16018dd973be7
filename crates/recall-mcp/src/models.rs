//! MCP models.
//!
//! Tool input parameters and output responses. They wrap or transform
//! recall domain types for MCP transport; all internal references use
//! ids, serials are display-only.

use recall::domain::{
    Memory, MemoryCategory, MemoryPriority, MemoryStatus, Task, TaskCategory, TaskPriority,
    TaskStatus,
};
use recall::service::{ContextMemory, ContextSubtask, TaskContext};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Tool Input Parameters
// ============================================================================

/// Parameters for the `add_memory` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddMemoryParams {
    /// The note content (markdown).
    pub content: String,

    /// Freeform tags.
    pub tags: Option<Vec<String>>,

    /// Category (personal, work, code, research, conversations, preferences).
    pub category: Option<String>,

    /// Project label; sanitized, defaults to "default".
    pub project: Option<String>,

    /// Priority (low, medium, high).
    pub priority: Option<String>,

    /// Status (active, archived, reference).
    pub status: Option<String>,

    /// Ids of related memories.
    pub related_memories: Option<Vec<String>>,

    /// Language hint for code content.
    pub language: Option<String>,

    /// Display title.
    pub title: Option<String>,

    /// One-line summary.
    pub summary: Option<String>,
}

/// Parameters for the `get_memory` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetMemoryParams {
    /// The memory id.
    pub id: String,
}

/// Parameters for the `list_memories` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListMemoriesParams {
    /// Restrict to one project.
    pub project: Option<String>,

    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Parameters for the `search_memories` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchMemoriesParams {
    /// The search query (case-insensitive substring).
    pub query: String,

    /// Restrict to one project.
    pub project: Option<String>,
}

/// Parameters for the `delete_memory` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteMemoryParams {
    /// The memory id.
    pub id: String,
}

/// Parameters for the `create_task` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateTaskParams {
    /// Task title.
    pub title: String,

    /// Task description (markdown).
    pub description: Option<String>,

    /// Project label.
    pub project: Option<String>,

    /// Category (personal, work, code, research).
    pub category: Option<String>,

    /// Priority (low, medium, high, urgent).
    pub priority: Option<String>,

    /// Parent task id.
    pub parent_task: Option<String>,

    /// Freeform tags.
    pub tags: Option<Vec<String>>,

    /// Run the auto-linker after create (default true).
    pub auto_link: Option<bool>,

    /// Memory ids to attach as manual connections.
    pub manual_memories: Option<Vec<String>>,
}

/// Parameters for the `update_task` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateTaskParams {
    /// The task id.
    pub id: String,

    /// New title.
    pub title: Option<String>,

    /// New description.
    pub description: Option<String>,

    /// New status (todo, in_progress, done, blocked); transitions are
    /// validated.
    pub status: Option<String>,

    /// New priority.
    pub priority: Option<String>,

    /// New category. Empty string clears it.
    pub category: Option<String>,

    /// Replacement tag list.
    pub tags: Option<Vec<String>>,

    /// New project label (the task file is relocated).
    pub project: Option<String>,

    /// New parent task id. Empty string detaches from the parent.
    pub parent_task: Option<String>,

    /// Replacement manual memory list.
    pub manual_memories: Option<Vec<String>>,
}

/// Parameters for the `list_tasks` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListTasksParams {
    /// Restrict to one project.
    pub project: Option<String>,

    /// Restrict to one status.
    pub status: Option<String>,

    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Parameters for the `get_task_context` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTaskContextParams {
    /// The task id (serials are accepted too).
    pub id: String,

    /// Assembly depth: "shallow" (default) or "deep".
    pub depth: Option<String>,
}

/// Parameters for the `delete_task` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteTaskParams {
    /// The task id.
    pub id: String,
}

/// Parameters for the `test_tool` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestToolParams {
    /// Message to echo back.
    pub message: String,
}

// ============================================================================
// Tool Output Responses
// ============================================================================

/// Response from `add_memory`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddMemoryResponse {
    /// The new memory's id.
    pub id: String,

    /// The new memory's serial.
    pub serial: String,

    /// Where the file was written (relative to the memories root).
    pub file: String,

    /// Derived complexity (1-4).
    pub complexity: u8,

    /// Derived content type.
    pub content_type: String,
}

/// Response from the delete tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteResponse {
    /// The id that was targeted.
    pub id: String,

    /// Whether an entity was actually removed (deletes are
    /// idempotent, so `false` still reports success).
    pub deleted: bool,
}

/// Response from `test_tool`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestToolResponse {
    /// The echoed message.
    pub echo: String,

    /// Server version.
    pub version: String,

    /// Whether the semantic index is live.
    pub semantic_search: bool,
}

/// Memory representation for MCP responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpMemory {
    /// Unique id.
    pub id: String,

    /// Display serial.
    pub serial: String,

    /// Creation timestamp (RFC 3339).
    pub timestamp: String,

    /// Derived complexity (1-4).
    pub complexity: u8,

    /// Category, if set.
    pub category: Option<String>,

    /// Project label.
    pub project: String,

    /// Tags.
    pub tags: Vec<String>,

    /// Priority.
    pub priority: String,

    /// Lifecycle status.
    pub status: String,

    /// Related memory ids.
    pub related_memories: Vec<String>,

    /// Mirrored task links.
    pub task_connections: Vec<McpTaskConnection>,

    /// Access count.
    pub access_count: u64,

    /// Last access (RFC 3339), if ever fetched.
    pub last_accessed: Option<String>,

    /// Derived content type.
    pub content_type: String,

    /// Language hint, if any.
    pub language: Option<String>,

    /// Body size in bytes.
    pub size: u64,

    /// Whether the body contains a mermaid diagram.
    pub mermaid_diagram: bool,

    /// Display title, if set.
    pub title: Option<String>,

    /// One-line summary, if set.
    pub summary: Option<String>,

    /// The markdown body.
    pub content: String,
}

impl From<Memory> for McpMemory {
    fn from(memory: Memory) -> Self {
        Self {
            id: memory.id.to_string(),
            serial: memory.serial,
            timestamp: memory.timestamp.to_rfc3339(),
            complexity: memory.complexity,
            category: memory.category.map(|c| c.as_str().to_string()),
            project: memory.project,
            tags: memory.tags,
            priority: memory.priority.as_str().to_string(),
            status: memory.status.as_str().to_string(),
            related_memories: memory
                .related_memories
                .iter()
                .map(ToString::to_string)
                .collect(),
            task_connections: memory
                .task_connections
                .into_iter()
                .map(Into::into)
                .collect(),
            access_count: memory.access_count,
            last_accessed: memory.last_accessed.map(|t| t.to_rfc3339()),
            content_type: memory.metadata.content_type.as_str().to_string(),
            language: memory.metadata.language,
            size: memory.metadata.size,
            mermaid_diagram: memory.metadata.mermaid_diagram,
            title: memory.title,
            summary: memory.summary,
            content: memory.body,
        }
    }
}

/// Memory-side task link for MCP responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpTaskConnection {
    /// Linking task id.
    pub task_id: String,

    /// Linking task serial.
    pub task_serial: String,

    /// Connection type.
    pub connection_type: String,

    /// When the link was made (RFC 3339).
    pub created: String,
}

impl From<recall::domain::TaskConnection> for McpTaskConnection {
    fn from(connection: recall::domain::TaskConnection) -> Self {
        Self {
            task_id: connection.task_id.to_string(),
            task_serial: connection.task_serial,
            connection_type: connection.connection_type.as_str().to_string(),
            created: connection.created.to_rfc3339(),
        }
    }
}

/// Task representation for MCP responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpTask {
    /// Unique id.
    pub id: String,

    /// Display serial.
    pub serial: String,

    /// Title.
    pub title: String,

    /// Description.
    pub description: String,

    /// Project label.
    pub project: String,

    /// Category, if set.
    pub category: Option<String>,

    /// Priority.
    pub priority: String,

    /// Status.
    pub status: String,

    /// Parent task id, if any.
    pub parent_task: Option<String>,

    /// Subtask ids.
    pub subtasks: Vec<String>,

    /// Tags.
    pub tags: Vec<String>,

    /// Memory connections.
    pub memory_connections: Vec<McpMemoryConnection>,

    /// Manually attached memory ids.
    pub manual_memories: Vec<String>,

    /// Creation timestamp (RFC 3339).
    pub created: String,

    /// Last update timestamp (RFC 3339).
    pub updated: String,

    /// First completion timestamp (RFC 3339), one-shot.
    pub completed: Option<String>,
}

impl From<Task> for McpTask {
    fn from(task: Task) -> Self {
        Self {
            id: task.id.to_string(),
            serial: task.serial,
            title: task.title,
            description: task.description,
            project: task.project,
            category: task.category.map(|c| c.as_str().to_string()),
            priority: task.priority.as_str().to_string(),
            status: task.status.as_str().to_string(),
            parent_task: task.parent_task.map(|p| p.to_string()),
            subtasks: task.subtasks.iter().map(ToString::to_string).collect(),
            tags: task.tags,
            memory_connections: task
                .memory_connections
                .into_iter()
                .map(Into::into)
                .collect(),
            manual_memories: task
                .manual_memories
                .iter()
                .map(ToString::to_string)
                .collect(),
            created: task.created.to_rfc3339(),
            updated: task.updated.to_rfc3339(),
            completed: task.completed.map(|t| t.to_rfc3339()),
        }
    }
}

/// Task-side memory link for MCP responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpMemoryConnection {
    /// Linked memory id.
    pub memory_id: String,

    /// Linked memory serial.
    pub memory_serial: String,

    /// Connection type.
    pub connection_type: String,

    /// Relevance in [0, 1].
    pub relevance: f64,

    /// Task terms that matched the memory.
    pub matched_terms: Vec<String>,
}

impl From<recall::domain::MemoryConnection> for McpMemoryConnection {
    fn from(connection: recall::domain::MemoryConnection) -> Self {
        Self {
            memory_id: connection.memory_id.to_string(),
            memory_serial: connection.memory_serial,
            connection_type: connection.connection_type.as_str().to_string(),
            relevance: connection.relevance,
            matched_terms: connection.matched_terms,
        }
    }
}

/// A linked memory inside a task context response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpContextMemory {
    /// Memory id.
    pub id: String,
    /// Memory serial.
    pub serial: String,
    /// Connection type.
    pub connection_type: String,
    /// Relevance.
    pub relevance: f64,
    /// Title, if set.
    pub title: Option<String>,
    /// Leading body snippet.
    pub snippet: String,
}

impl From<ContextMemory> for McpContextMemory {
    fn from(memory: ContextMemory) -> Self {
        Self {
            id: memory.id,
            serial: memory.serial,
            connection_type: memory.connection_type,
            relevance: memory.relevance,
            title: memory.title,
            snippet: memory.snippet,
        }
    }
}

/// A subtask with its memories inside a deep task context.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpContextSubtask {
    /// The subtask.
    pub task: McpTask,
    /// Its linked memories.
    pub memories: Vec<McpContextMemory>,
}

/// Response from `get_task_context`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpTaskContext {
    /// The task.
    pub task: McpTask,
    /// Its linked memories.
    pub memories: Vec<McpContextMemory>,
    /// Subtasks with their memories (deep only).
    pub subtasks: Vec<McpContextSubtask>,
    /// Ancestor serials, nearest first (deep only).
    pub parent_chain: Vec<String>,
}

impl From<TaskContext> for McpTaskContext {
    fn from(context: TaskContext) -> Self {
        Self {
            task: context.task.into(),
            memories: context.memories.into_iter().map(Into::into).collect(),
            subtasks: context
                .subtasks
                .into_iter()
                .map(|ContextSubtask { task, memories }| McpContextSubtask {
                    task: task.into(),
                    memories: memories.into_iter().map(Into::into).collect(),
                })
                .collect(),
            parent_chain: context.parent_chain,
        }
    }
}

// ============================================================================
// Enum parsing
// ============================================================================

/// Parse a memory category argument.
///
/// # Errors
///
/// `InvalidArgument` naming the valid values.
pub fn parse_memory_category(s: &str) -> Result<MemoryCategory> {
    MemoryCategory::parse(&s.to_lowercase()).ok_or_else(|| Error::InvalidArgument {
        field: "category",
        value: s.to_string(),
        valid_values: "personal, work, code, research, conversations, preferences",
    })
}

/// Parse a task category argument.
///
/// # Errors
///
/// `InvalidArgument` naming the valid values.
pub fn parse_task_category(s: &str) -> Result<TaskCategory> {
    TaskCategory::parse(&s.to_lowercase()).ok_or_else(|| Error::InvalidArgument {
        field: "category",
        value: s.to_string(),
        valid_values: "personal, work, code, research",
    })
}

/// Parse a memory priority argument.
///
/// # Errors
///
/// `InvalidArgument` naming the valid values.
pub fn parse_memory_priority(s: &str) -> Result<MemoryPriority> {
    MemoryPriority::parse(&s.to_lowercase()).ok_or_else(|| Error::InvalidArgument {
        field: "priority",
        value: s.to_string(),
        valid_values: "low, medium, high",
    })
}

/// Parse a task priority argument.
///
/// # Errors
///
/// `InvalidArgument` naming the valid values.
pub fn parse_task_priority(s: &str) -> Result<TaskPriority> {
    TaskPriority::parse(&s.to_lowercase()).ok_or_else(|| Error::InvalidArgument {
        field: "priority",
        value: s.to_string(),
        valid_values: "low, medium, high, urgent",
    })
}

/// Parse a memory status argument.
///
/// # Errors
///
/// `InvalidArgument` naming the valid values.
pub fn parse_memory_status(s: &str) -> Result<MemoryStatus> {
    MemoryStatus::parse(&s.to_lowercase()).ok_or_else(|| Error::InvalidArgument {
        field: "status",
        value: s.to_string(),
        valid_values: "active, archived, reference",
    })
}

/// Parse a task status argument.
///
/// # Errors
///
/// `InvalidArgument` naming the valid values.
pub fn parse_task_status(s: &str) -> Result<TaskStatus> {
    TaskStatus::parse(&s.to_lowercase()).ok_or_else(|| Error::InvalidArgument {
        field: "status",
        value: s.to_string(),
        valid_values: "todo, in_progress, done, blocked",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::todo("todo", Some(TaskStatus::Todo))]
    #[case::in_progress("in_progress", Some(TaskStatus::InProgress))]
    #[case::in_progress_hyphen("in-progress", Some(TaskStatus::InProgress))]
    #[case::done("DONE", Some(TaskStatus::Done))]
    #[case::blocked("blocked", Some(TaskStatus::Blocked))]
    #[case::archived("archived", None)]
    #[case::empty("", None)]
    fn task_status_parsing(#[case] input: &str, #[case] expected: Option<TaskStatus>) {
        assert_eq!(parse_task_status(input).ok(), expected);
    }

    #[rstest]
    #[case::code("code", Some(MemoryCategory::Code))]
    #[case::uppercase("RESEARCH", Some(MemoryCategory::Research))]
    #[case::conversations("conversations", Some(MemoryCategory::Conversations))]
    #[case::invalid("musings", None)]
    fn memory_category_parsing(#[case] input: &str, #[case] expected: Option<MemoryCategory>) {
        assert_eq!(parse_memory_category(input).ok(), expected);
    }

    #[test]
    fn invalid_argument_lists_valid_values() {
        let err = parse_task_status("archived").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("archived"));
        assert!(text.contains("todo, in_progress, done, blocked"));
    }

    #[test]
    fn urgent_is_task_only() {
        assert!(parse_task_priority("urgent").is_ok());
        assert!(parse_memory_priority("urgent").is_err());
    }
}
