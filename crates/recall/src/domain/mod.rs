//! Domain types for the recall store.
//!
//! Two linked entity types: memories (freeform notes) and tasks (work
//! items), plus the connection records tying them together. Both
//! serialize to per-entity markdown files via `recall-markdown`
//! documents; the `to_document` / `from_document` pairs on each entity
//! are the only place header field names appear.

mod connection;
mod memory;
mod task;

pub use connection::{ConnectionType, MemoryConnection, TaskConnection};
pub use memory::{
    derive_complexity, derive_content_type, has_mermaid_diagram, ContentType, Memory,
    MemoryCategory, MemoryFilter, MemoryId, MemoryMetadata, MemoryPriority, MemoryStatus,
    MemoryUpdate, NewMemory,
};
pub use task::{
    NewTask, Task, TaskCategory, TaskFilter, TaskId, TaskPriority, TaskStatus, TaskUpdate,
    MAX_TITLE_LENGTH,
};

pub(crate) use memory::{parse_rfc3339, rfc3339};

use chrono::{DateTime, Timelike, Utc};

/// The project label used when none is given.
pub const DEFAULT_PROJECT: &str = "default";

/// The current time truncated to whole seconds.
///
/// Timestamps are serialized at second precision; stamping entities
/// with truncated values keeps the in-memory record equal to what a
/// reload from disk produces.
#[must_use]
pub fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}
