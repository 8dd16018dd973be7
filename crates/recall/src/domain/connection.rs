//! Connection records linking tasks and memories.
//!
//! A connection is mirrored on both sides: the task holds a
//! [`MemoryConnection`] and the linked memory holds a matching
//! [`TaskConnection`]. The store maintains the invariant that (except
//! transiently, mid-write) each non-manual entry on one side has its
//! mirror on the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::memory::MemoryId;
use super::task::TaskId;

/// How a task relates to a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Background material (research / conversation memories).
    Research,

    /// Code memory created shortly before the task.
    Implementation,

    /// Anything else the linker selected.
    Reference,

    /// Explicitly attached by the user; never produced by the linker.
    Manual,
}

impl ConnectionType {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Implementation => "implementation",
            Self::Reference => "reference",
            Self::Manual => "manual",
        }
    }

    /// Parse a lowercase connection type name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(Self::Research),
            "implementation" => Some(Self::Implementation),
            "reference" => Some(Self::Reference),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task-side link to a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConnection {
    /// Id of the linked memory.
    pub memory_id: MemoryId,

    /// Display serial of the linked memory (`MEM-XXXXXX`).
    pub memory_serial: String,

    /// Relationship kind.
    pub connection_type: ConnectionType,

    /// Relevance score in `[0, 1]`. Manual connections are always `1.0`.
    pub relevance: f64,

    /// The extracted task terms that matched the memory.
    pub matched_terms: Vec<String>,
}

impl MemoryConnection {
    /// Encode for a front-matter list item.
    ///
    /// Connections are stored as whitespace-separated fields inside the
    /// header's flow list (the restricted header subset has no list of
    /// maps): `<memory_id> <memory_serial> <type> <relevance> [terms]`,
    /// with matched terms comma-joined. Ids, serials, type names and
    /// extracted terms never contain whitespace.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = format!(
            "{} {} {} {:.4}",
            self.memory_id, self.memory_serial, self.connection_type, self.relevance
        );
        if !self.matched_terms.is_empty() {
            out.push(' ');
            out.push_str(&self.matched_terms.join(","));
        }
        out
    }

    /// Decode a front-matter list item written by [`Self::encode`].
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let memory_id = MemoryId::new(parts.next()?);
        let memory_serial = parts.next()?.to_string();
        let connection_type = ConnectionType::parse(parts.next()?)?;
        let relevance = parts.next()?.parse::<f64>().ok()?;
        let matched_terms = parts
            .next()
            .map(|terms| terms.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        Some(Self {
            memory_id,
            memory_serial,
            connection_type,
            relevance,
            matched_terms,
        })
    }
}

/// A memory-side link back to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConnection {
    /// Id of the linking task.
    pub task_id: TaskId,

    /// Display serial of the linking task (`TASK-NNNNN`).
    pub task_serial: String,

    /// Relationship kind, mirroring the task side.
    pub connection_type: ConnectionType,

    /// When the link was established.
    pub created: DateTime<Utc>,
}

impl TaskConnection {
    /// Encode for a front-matter list item:
    /// `<task_id> <task_serial> <type> <created>`.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{} {} {} {}",
            self.task_id,
            self.task_serial,
            self.connection_type,
            self.created.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        )
    }

    /// Decode a front-matter list item written by [`Self::encode`].
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let task_id = TaskId::new(parts.next()?);
        let task_serial = parts.next()?.to_string();
        let connection_type = ConnectionType::parse(parts.next()?)?;
        let created = DateTime::parse_from_rfc3339(parts.next()?)
            .ok()?
            .with_timezone(&Utc);
        Some(Self {
            task_id,
            task_serial,
            connection_type,
            created,
        })
    }
}
