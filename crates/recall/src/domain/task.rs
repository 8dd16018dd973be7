//! The task entity: a work item with status, hierarchy and memory links.

use chrono::{DateTime, Utc};
use recall_markdown::{Document, FrontMatter, Scalar, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::connection::MemoryConnection;
use super::memory::{parse_rfc3339, rfc3339, MemoryId};

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new task ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task category (a subset of the memory categories).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    /// Personal work.
    Personal,
    /// Day-job work.
    Work,
    /// Coding work.
    Code,
    /// Research work.
    Research,
}

impl TaskCategory {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Work => "work",
            Self::Code => "code",
            Self::Research => "research",
        }
    }

    /// Parse a lowercase category name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "personal" => Some(Self::Personal),
            "work" => Some(Self::Work),
            "code" => Some(Self::Code),
            "research" => Some(Self::Research),
            _ => None,
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Medium priority (default).
    #[default]
    Medium,
    /// High priority.
    High,
    /// Drop-everything priority.
    Urgent,
}

impl TaskPriority {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Parse a lowercase priority name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task workflow status.
///
/// The legal transition edges are:
///
/// ```text
/// todo        -> in_progress | blocked | done
/// in_progress -> done | blocked | todo
/// blocked     -> in_progress | todo
/// done        -> todo        (reopen)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started (initial status).
    #[default]
    Todo,
    /// Being worked on.
    #[serde(rename = "in_progress")]
    InProgress,
    /// Finished.
    Done,
    /// Waiting on something.
    Blocked,
}

impl TaskStatus {
    /// Canonical snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    /// Parse a status name (accepts `in_progress` and `in-progress`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Whether `self -> to` is a legal transition.
    ///
    /// A no-op transition (same status) is always legal.
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        use TaskStatus::{Blocked, Done, InProgress, Todo};
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Todo, InProgress | Blocked | Done)
                | (InProgress, Done | Blocked | Todo)
                | (Blocked, InProgress | Todo)
                | (Done, Todo)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque unique id (`task-…`).
    pub id: TaskId,

    /// Human-visible serial (`TASK-NNNNN`), monotonic per store.
    pub serial: String,

    /// Task title.
    pub title: String,

    /// Task description.
    pub description: String,

    /// Sanitized project label.
    pub project: String,

    /// Optional category.
    pub category: Option<TaskCategory>,

    /// Priority.
    pub priority: TaskPriority,

    /// Workflow status.
    pub status: TaskStatus,

    /// Parent task id, when this is a subtask.
    pub parent_task: Option<TaskId>,

    /// Child task ids. Every subtask's `parent_task` points back here.
    pub subtasks: Vec<TaskId>,

    /// Freeform tags.
    pub tags: Vec<String>,

    /// Links to memories (auto plus manual).
    pub memory_connections: Vec<MemoryConnection>,

    /// Memory ids the user attached explicitly.
    pub manual_memories: Vec<MemoryId>,

    /// Creation timestamp. Immutable after create.
    pub created: DateTime<Utc>,

    /// Last mutation timestamp, stamped by the store.
    pub updated: DateTime<Utc>,

    /// First time the task reached `done`. One-shot: never cleared or
    /// re-stamped by reopen/re-complete cycles.
    pub completed: Option<DateTime<Utc>>,
}

impl Task {
    /// The numeric part of the serial, for monotonicity bookkeeping.
    #[must_use]
    pub fn serial_number(&self) -> Option<u64> {
        self.serial.strip_prefix("TASK-")?.parse().ok()
    }
}

/// Maximum length for task titles.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Data for creating a new task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Task title.
    pub title: String,

    /// Task description.
    pub description: String,

    /// Project label (sanitized by the store).
    pub project: Option<String>,

    /// Optional category.
    pub category: Option<TaskCategory>,

    /// Priority (defaults to medium).
    pub priority: Option<TaskPriority>,

    /// Parent task id.
    pub parent_task: Option<TaskId>,

    /// Freeform tags.
    pub tags: Vec<String>,

    /// Whether to run the auto-linker after create (defaults to true).
    pub auto_link: Option<bool>,

    /// Memory ids to attach as manual connections.
    pub manual_memories: Vec<MemoryId>,
}

impl NewTask {
    /// Validate the new task data.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation: empty or oversized
    /// title.
    pub fn validate(&self) -> Result<(), String> {
        let trimmed = self.title.trim();
        if trimmed.is_empty() {
            return Err("Title cannot be empty".to_string());
        }
        if trimmed.len() > MAX_TITLE_LENGTH {
            return Err(format!(
                "Title cannot exceed {MAX_TITLE_LENGTH} characters (got {})",
                trimmed.len()
            ));
        }
        Ok(())
    }
}

/// Data for updating an existing task.
///
/// `None` leaves a field unchanged; `parent_task` uses the double-Option
/// pattern (`Some(None)` detaches from the parent).
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// New title.
    pub title: Option<String>,

    /// New description.
    pub description: Option<String>,

    /// New status (validated against the transition table).
    pub status: Option<TaskStatus>,

    /// New priority.
    pub priority: Option<TaskPriority>,

    /// Category change (`Some(None)` clears it).
    pub category: Option<Option<TaskCategory>>,

    /// Replacement tag list.
    pub tags: Option<Vec<String>>,

    /// New project label. The store relocates the task file.
    pub project: Option<String>,

    /// Parent change (`Some(None)` detaches).
    pub parent_task: Option<Option<TaskId>>,

    /// Replacement manual memory list.
    pub manual_memories: Option<Vec<MemoryId>>,
}

impl TaskUpdate {
    /// Whether this patch touches a field the auto-linker keys on.
    #[must_use]
    pub fn affects_linking(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.tags.is_some()
            || self.project.is_some()
            || self.manual_memories.is_some()
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to one project.
    pub project: Option<String>,

    /// Restrict to one status.
    pub status: Option<TaskStatus>,

    /// Maximum number of results.
    pub limit: Option<usize>,
}

// ============================================================================
// Document mapping
// ============================================================================

impl Task {
    /// Render this task to its on-disk document. The description is the
    /// document body.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut fm = FrontMatter::new();
        fm.set("id", Scalar::from(self.id.as_str()));
        fm.set("serial", Scalar::from(self.serial.as_str()));
        fm.set("title", Scalar::from(self.title.as_str()));
        fm.set("project", Scalar::from(self.project.as_str()));
        if let Some(category) = self.category {
            fm.set("category", Scalar::from(category.as_str()));
        }
        fm.set("priority", Scalar::from(self.priority.as_str()));
        fm.set("status", Scalar::from(self.status.as_str()));
        if let Some(parent) = &self.parent_task {
            fm.set("parent_task", Scalar::from(parent.as_str()));
        }
        fm.set(
            "subtasks",
            Value::List(self.subtasks.iter().map(ToString::to_string).collect()),
        );
        fm.set("tags", Value::List(self.tags.clone()));
        fm.set(
            "memory_connections",
            Value::List(
                self.memory_connections
                    .iter()
                    .map(MemoryConnection::encode)
                    .collect(),
            ),
        );
        fm.set(
            "manual_memories",
            Value::List(self.manual_memories.iter().map(ToString::to_string).collect()),
        );
        fm.set("created", Scalar::from(rfc3339(self.created)));
        fm.set("updated", Scalar::from(rfc3339(self.updated)));
        if let Some(completed) = self.completed {
            fm.set("completed", Scalar::from(rfc3339(completed)));
        }
        Document::new(fm, self.description.clone())
    }

    /// Reconstruct a task from its on-disk document.
    ///
    /// # Errors
    ///
    /// Returns a description of the defect when `id` or `title` is
    /// missing, or a core field is unparseable.
    pub fn from_document(doc: &Document) -> Result<Self, String> {
        let fm = &doc.front_matter;
        let id = fm
            .get_str("id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing 'id' field".to_string())?;
        let title = fm
            .get_str("title")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing 'title' field".to_string())?;

        let status = match fm.get_str("status") {
            Some(raw) => {
                TaskStatus::parse(raw).ok_or_else(|| format!("unknown 'status': {raw}"))?
            }
            None => TaskStatus::Todo,
        };
        let category = match fm.get_str("category") {
            Some(raw) => {
                Some(TaskCategory::parse(raw).ok_or_else(|| format!("unknown 'category': {raw}"))?)
            }
            None => None,
        };

        let created = fm
            .get_str("created")
            .and_then(parse_rfc3339)
            .ok_or_else(|| "missing or unparseable 'created'".to_string())?;

        Ok(Self {
            id: TaskId::new(id),
            serial: fm.get_str("serial").unwrap_or_default().to_string(),
            title: title.to_string(),
            description: doc.body.clone(),
            project: fm
                .get_str("project")
                .filter(|s| !s.is_empty())
                .unwrap_or(super::DEFAULT_PROJECT)
                .to_string(),
            category,
            priority: fm
                .get_str("priority")
                .and_then(TaskPriority::parse)
                .unwrap_or_default(),
            status,
            parent_task: fm.get_str("parent_task").map(TaskId::from),
            subtasks: fm
                .get_list("subtasks")
                .map(|items| items.iter().map(|s| TaskId::from(s.as_str())).collect())
                .unwrap_or_default(),
            tags: fm.get_list("tags").map(<[String]>::to_vec).unwrap_or_default(),
            memory_connections: fm
                .get_list("memory_connections")
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|raw| MemoryConnection::decode(raw))
                        .collect()
                })
                .unwrap_or_default(),
            manual_memories: fm
                .get_list("manual_memories")
                .map(|items| items.iter().map(|s| MemoryId::from(s.as_str())).collect())
                .unwrap_or_default(),
            created,
            updated: fm.get_str("updated").and_then(parse_rfc3339).unwrap_or(created),
            completed: fm.get_str("completed").and_then(parse_rfc3339),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionType;
    use rstest::rstest;

    fn sample_task() -> Task {
        let created = parse_rfc3339("2025-06-02T08:00:00Z").unwrap();
        Task {
            id: TaskId::new("task-1a2b"),
            serial: "TASK-00004".to_string(),
            title: "Implement retry with backoff".to_string(),
            description: "Add exponential backoff to the API client.\n".to_string(),
            project: "payments".to_string(),
            category: Some(TaskCategory::Code),
            priority: TaskPriority::High,
            status: TaskStatus::InProgress,
            parent_task: Some(TaskId::new("task-0p0p")),
            subtasks: vec![TaskId::new("task-3c3c")],
            tags: vec!["api".to_string()],
            memory_connections: vec![MemoryConnection {
                memory_id: MemoryId::new("mem-8k2p"),
                memory_serial: "MEM-000042".to_string(),
                connection_type: ConnectionType::Implementation,
                relevance: 0.62,
                matched_terms: vec!["retry".to_string(), "backoff".to_string()],
            }],
            manual_memories: vec![],
            created,
            updated: parse_rfc3339("2025-06-02T09:00:00Z").unwrap(),
            completed: None,
        }
    }

    #[test]
    fn document_round_trip() {
        let task = sample_task();
        let restored = Task::from_document(&task.to_document()).unwrap();
        assert_eq!(restored, task);
    }

    #[test]
    fn serial_number_extraction() {
        let task = sample_task();
        assert_eq!(task.serial_number(), Some(4));

        let mut odd = sample_task();
        odd.serial = "BOGUS-1".to_string();
        assert_eq!(odd.serial_number(), None);
    }

    #[rstest]
    #[case::todo_in_progress(TaskStatus::Todo, TaskStatus::InProgress, true)]
    #[case::todo_blocked(TaskStatus::Todo, TaskStatus::Blocked, true)]
    #[case::todo_done(TaskStatus::Todo, TaskStatus::Done, true)]
    #[case::in_progress_done(TaskStatus::InProgress, TaskStatus::Done, true)]
    #[case::in_progress_todo(TaskStatus::InProgress, TaskStatus::Todo, true)]
    #[case::blocked_in_progress(TaskStatus::Blocked, TaskStatus::InProgress, true)]
    #[case::blocked_todo(TaskStatus::Blocked, TaskStatus::Todo, true)]
    #[case::blocked_done(TaskStatus::Blocked, TaskStatus::Done, false)]
    #[case::done_reopen(TaskStatus::Done, TaskStatus::Todo, true)]
    #[case::done_in_progress(TaskStatus::Done, TaskStatus::InProgress, false)]
    #[case::done_blocked(TaskStatus::Done, TaskStatus::Blocked, false)]
    #[case::same_status(TaskStatus::Blocked, TaskStatus::Blocked, true)]
    fn status_transitions(
        #[case] from: TaskStatus,
        #[case] to: TaskStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition(to), allowed);
    }

    #[test]
    fn validate_title_bounds() {
        let mut new = NewTask {
            title: "Valid".to_string(),
            ..Default::default()
        };
        assert!(new.validate().is_ok());

        new.title = "   ".to_string();
        assert!(new.validate().is_err());

        new.title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(new.validate().is_err());
    }

    #[test]
    fn update_linker_trigger_fields() {
        assert!(!TaskUpdate::default().affects_linking());
        assert!(TaskUpdate {
            title: Some("t".to_string()),
            ..Default::default()
        }
        .affects_linking());
        assert!(TaskUpdate {
            tags: Some(vec![]),
            ..Default::default()
        }
        .affects_linking());
        assert!(!TaskUpdate {
            status: Some(TaskStatus::Done),
            ..Default::default()
        }
        .affects_linking());
    }

    #[test]
    fn from_document_defaults() {
        let (doc, _) = recall_markdown::Document::parse(
            "---\nid: task-1\ntitle: Bare task\ncreated: 2025-06-01T00:00:00Z\n---\n\n",
        );
        let task = Task::from_document(&doc).unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.project, "default");
        assert!(task.subtasks.is_empty());
        assert_eq!(task.updated, task.created);
    }
}
