//! The memory entity: a freeform note with a structured header.

use chrono::{DateTime, SecondsFormat, Utc};
use recall_markdown::{Document, FrontMatter, Scalar, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::connection::TaskConnection;

/// Unique identifier for a memory.
///
/// Wraps the opaque id string in a newtype for type safety.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(String);

impl MemoryId {
    /// Create a new memory ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Memory category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// Personal notes.
    Personal,
    /// Work notes.
    Work,
    /// Code snippets and technical notes.
    Code,
    /// Research material.
    Research,
    /// Conversation transcripts and summaries.
    Conversations,
    /// Preferences and settings notes.
    Preferences,
}

impl MemoryCategory {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Work => "work",
            Self::Code => "code",
            Self::Research => "research",
            Self::Conversations => "conversations",
            Self::Preferences => "preferences",
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
            "conversations" => Some(Self::Conversations),
            "preferences" => Some(Self::Preferences),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPriority {
    /// Low priority.
    Low,
    /// Medium priority (default).
    #[default]
    Medium,
    /// High priority.
    High,
}

impl MemoryPriority {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse a lowercase priority name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    /// Live note (default).
    #[default]
    Active,
    /// Kept but no longer surfaced by default.
    Archived,
    /// Long-lived reference material.
    Reference,
}

impl MemoryStatus {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Reference => "reference",
        }
    }

    /// Parse a lowercase status name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived body content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain prose (default).
    #[default]
    Text,
    /// Source code.
    Code,
    /// Structured data (JSON / YAML / mermaid).
    Structured,
}

impl ContentType {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Structured => "structured",
        }
    }

    /// Parse a lowercase content type name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "code" => Some(Self::Code),
            "structured" => Some(Self::Structured),
            _ => None,
        }
    }
}

/// Derived metadata about a memory body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Derived content type.
    pub content_type: ContentType,

    /// Language hint for code memories.
    pub language: Option<String>,

    /// Body size in bytes.
    pub size: u64,

    /// Whether the body contains a mermaid diagram block.
    pub mermaid_diagram: bool,
}

/// A single memory: structured header plus freeform markdown body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Opaque unique id (`mem-…`).
    pub id: MemoryId,

    /// Human-visible serial (`MEM-XXXXXX`).
    pub serial: String,

    /// Creation timestamp. Immutable after create.
    pub timestamp: DateTime<Utc>,

    /// Derived complexity bucket, 1–4.
    pub complexity: u8,

    /// Optional category.
    pub category: Option<MemoryCategory>,

    /// Sanitized project label (`default` when unset).
    pub project: String,

    /// Freeform tags.
    pub tags: Vec<String>,

    /// Priority.
    pub priority: MemoryPriority,

    /// Lifecycle status.
    pub status: MemoryStatus,

    /// Related memory ids.
    pub related_memories: Vec<MemoryId>,

    /// Mirrored links from tasks.
    pub task_connections: Vec<TaskConnection>,

    /// Times this memory was fetched.
    pub access_count: u64,

    /// Last fetch time.
    pub last_accessed: Option<DateTime<Utc>>,

    /// Derived body metadata.
    pub metadata: MemoryMetadata,

    /// Optional display title.
    pub title: Option<String>,

    /// Optional one-line summary.
    pub summary: Option<String>,

    /// The markdown body.
    pub body: String,
}

/// Data for creating a new memory.
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    /// The note content (becomes the body).
    pub content: String,

    /// Freeform tags.
    pub tags: Vec<String>,

    /// Optional category.
    pub category: Option<MemoryCategory>,

    /// Project label (sanitized by the store; `default` when empty).
    pub project: Option<String>,

    /// Priority (defaults to medium).
    pub priority: Option<MemoryPriority>,

    /// Status (defaults to active).
    pub status: Option<MemoryStatus>,

    /// Related memory ids.
    pub related_memories: Vec<MemoryId>,

    /// Language hint for code content.
    pub language: Option<String>,

    /// Optional display title.
    pub title: Option<String>,

    /// Optional one-line summary.
    pub summary: Option<String>,
}

impl NewMemory {
    /// Validate the new memory data.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation: empty content, or a
    /// tag containing whitespace-only text.
    pub fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("Content cannot be empty".to_string());
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err("Tags cannot be blank".to_string());
        }
        Ok(())
    }
}

/// Data for updating an existing memory.
///
/// `None` leaves a field unchanged. Clearable optional fields use the
/// double-Option pattern: `Some(None)` clears, `Some(Some(v))` sets.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    /// New body content.
    pub content: Option<String>,

    /// Replacement tag list.
    pub tags: Option<Vec<String>>,

    /// Category change (`Some(None)` clears it).
    pub category: Option<Option<MemoryCategory>>,

    /// New priority.
    pub priority: Option<MemoryPriority>,

    /// New status.
    pub status: Option<MemoryStatus>,

    /// Replacement related-memory list.
    pub related_memories: Option<Vec<MemoryId>>,

    /// Title change (`Some(None)` clears it).
    pub title: Option<Option<String>>,

    /// Summary change (`Some(None)` clears it).
    pub summary: Option<Option<String>>,
}

/// Filter for listing memories.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Restrict to one project.
    pub project: Option<String>,

    /// Restrict to one category.
    pub category: Option<MemoryCategory>,

    /// Restrict to memories carrying this tag.
    pub tag: Option<String>,

    /// Maximum number of results.
    pub limit: Option<usize>,
}

// ============================================================================
// Derivation heuristics
// ============================================================================

/// Derive the 1–4 complexity bucket for a memory. The highest matching
/// bucket wins.
#[must_use]
pub fn derive_complexity(memory: &Memory) -> u8 {
    let body_len = memory.body.chars().count();
    if body_len > 1000
        || memory.tags.len() > 5
        || memory.metadata.mermaid_diagram
        || memory.related_memories.len() > 2
    {
        return 4;
    }
    if memory.project != super::DEFAULT_PROJECT || !memory.related_memories.is_empty() {
        return 3;
    }
    if memory.category.is_some() || memory.tags.len() > 2 {
        return 2;
    }
    1
}

/// Derive the content type of a body by deterministic heuristics.
#[must_use]
pub fn derive_content_type(body: &str) -> ContentType {
    let trimmed = trim_leading_blank_lines(body);

    if is_structured_prelude(trimmed) {
        return ContentType::Structured;
    }
    if looks_like_code(body) {
        return ContentType::Code;
    }
    ContentType::Text
}

/// Whether the body contains a mermaid diagram block.
#[must_use]
pub fn has_mermaid_diagram(body: &str) -> bool {
    body.contains("```mermaid")
        || body
            .lines()
            .any(|line| matches!(line.trim(), "graph TD" | "graph LR" | "sequenceDiagram"))
}

fn trim_leading_blank_lines(body: &str) -> &str {
    let mut rest = body;
    while let Some(pos) = rest.find('\n') {
        if rest[..pos].trim().is_empty() {
            rest = &rest[pos + 1..];
        } else {
            break;
        }
    }
    rest
}

fn is_structured_prelude(trimmed: &str) -> bool {
    let start = trimmed.trim_start();
    // JSON object/array, YAML document marker, or a mermaid block first.
    start.starts_with('{')
        || start.starts_with('[')
        || start.starts_with("%YAML")
        || start.starts_with("```mermaid")
        || start.starts_with("graph TD")
        || start.starts_with("graph LR")
        || start.starts_with("sequenceDiagram")
}

fn looks_like_code(body: &str) -> bool {
    if body.contains("```") {
        return true;
    }
    let lowered = body.to_lowercase();
    if body.contains("function ")
        || body.contains("class ")
        || body.contains("import ")
        || body.contains("fn ")
        || body.contains("def ")
        || body.contains("#include")
    {
        return true;
    }
    // SQL: SELECT … FROM on one logical statement.
    if let Some(select) = lowered.find("select ") {
        if lowered[select..].contains(" from ") {
            return true;
        }
    }
    false
}

// ============================================================================
// Document mapping
// ============================================================================

impl Memory {
    /// Render this memory to its on-disk document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut fm = FrontMatter::new();
        fm.set("id", Scalar::from(self.id.as_str()));
        fm.set("serial", Scalar::from(self.serial.as_str()));
        fm.set("timestamp", Scalar::from(rfc3339(self.timestamp)));
        fm.set("complexity", Scalar::Integer(i64::from(self.complexity)));
        if let Some(category) = self.category {
            fm.set("category", Scalar::from(category.as_str()));
        }
        fm.set("project", Scalar::from(self.project.as_str()));
        fm.set("tags", Value::List(self.tags.clone()));
        fm.set("priority", Scalar::from(self.priority.as_str()));
        fm.set("status", Scalar::from(self.status.as_str()));
        fm.set(
            "related_memories",
            Value::List(self.related_memories.iter().map(ToString::to_string).collect()),
        );
        fm.set(
            "task_connections",
            Value::List(self.task_connections.iter().map(TaskConnection::encode).collect()),
        );
        #[allow(clippy::cast_possible_wrap)]
        fm.set("access_count", Scalar::Integer(self.access_count as i64));
        if let Some(last) = self.last_accessed {
            fm.set("last_accessed", Scalar::from(rfc3339(last)));
        }
        if let Some(title) = &self.title {
            fm.set("title", Scalar::from(title.as_str()));
        }
        if let Some(summary) = &self.summary {
            fm.set("summary", Scalar::from(summary.as_str()));
        }

        let mut metadata = vec![(
            "content_type".to_string(),
            Scalar::from(self.metadata.content_type.as_str()),
        )];
        if let Some(language) = &self.metadata.language {
            metadata.push(("language".to_string(), Scalar::from(language.as_str())));
        }
        #[allow(clippy::cast_possible_wrap)]
        metadata.push(("size".to_string(), Scalar::Integer(self.metadata.size as i64)));
        metadata.push((
            "mermaid_diagram".to_string(),
            Scalar::Bool(self.metadata.mermaid_diagram),
        ));
        fm.set("metadata", Value::Map(metadata));

        Document::new(fm, self.body.clone())
    }

    /// Reconstruct a memory from its on-disk document.
    ///
    /// Header fields that are missing get the documented defaults
    /// (`complexity: 1`, `status: active`, empty lists). Legacy
    /// `title:`/`summary:` pseudo-tags in the tag list are promoted to
    /// the first-class fields.
    ///
    /// # Errors
    ///
    /// Returns a description of the defect when the document lacks an
    /// `id` or carries unparseable core fields.
    pub fn from_document(doc: &Document) -> Result<Self, String> {
        let fm = &doc.front_matter;
        let id = fm
            .get_str("id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing 'id' field".to_string())?;

        let timestamp = match fm.get_str("timestamp") {
            Some(raw) => parse_rfc3339(raw)
                .ok_or_else(|| format!("unparseable 'timestamp': {raw}"))?,
            None => Utc::now(),
        };

        let category = match fm.get_str("category") {
            Some(raw) => Some(
                MemoryCategory::parse(raw)
                    .ok_or_else(|| format!("unknown 'category': {raw}"))?,
            ),
            None => None,
        };

        let mut tags: Vec<String> =
            fm.get_list("tags").map(<[String]>::to_vec).unwrap_or_default();

        // Promote legacy pseudo-tag metadata to first-class fields.
        let mut title = fm.get_str("title").map(str::to_string);
        let mut summary = fm.get_str("summary").map(str::to_string);
        tags.retain(|tag| {
            if let Some(rest) = tag.strip_prefix("title:") {
                if title.is_none() {
                    title = Some(rest.to_string());
                }
                false
            } else if let Some(rest) = tag.strip_prefix("summary:") {
                if summary.is_none() {
                    summary = Some(rest.to_string());
                }
                false
            } else {
                true
            }
        });

        let task_connections = fm
            .get_list("task_connections")
            .map(|items| items.iter().filter_map(|raw| TaskConnection::decode(raw)).collect())
            .unwrap_or_default();

        let related_memories = fm
            .get_list("related_memories")
            .map(|items| items.iter().map(|s| MemoryId::from(s.as_str())).collect())
            .unwrap_or_default();

        let metadata_entries = fm.get_map("metadata").unwrap_or(&[]);
        let map_str = |key: &str| {
            metadata_entries
                .iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| v.as_str().map(str::to_string))
        };
        let content_type = map_str("content_type")
            .and_then(|s| ContentType::parse(&s))
            .unwrap_or_else(|| derive_content_type(&doc.body));
        let metadata = MemoryMetadata {
            content_type,
            language: map_str("language"),
            size: metadata_entries
                .iter()
                .find(|(k, _)| k == "size")
                .and_then(|(_, v)| v.as_i64())
                .map_or(doc.body.len() as u64, |n| n.max(0).unsigned_abs()),
            mermaid_diagram: metadata_entries
                .iter()
                .find(|(k, _)| k == "mermaid_diagram")
                .and_then(|(_, v)| v.as_bool())
                .unwrap_or_else(|| has_mermaid_diagram(&doc.body)),
        };

        #[allow(clippy::cast_sign_loss)]
        let memory = Self {
            id: MemoryId::new(id),
            serial: fm.get_str("serial").unwrap_or_default().to_string(),
            timestamp,
            complexity: fm
                .get_i64("complexity")
                .map_or(1, |n| u8::try_from(n.clamp(1, 4)).unwrap_or(1)),
            category,
            project: fm
                .get_str("project")
                .filter(|s| !s.is_empty())
                .unwrap_or(super::DEFAULT_PROJECT)
                .to_string(),
            tags,
            priority: fm
                .get_str("priority")
                .and_then(MemoryPriority::parse)
                .unwrap_or_default(),
            status: fm
                .get_str("status")
                .and_then(MemoryStatus::parse)
                .unwrap_or_default(),
            related_memories,
            task_connections,
            access_count: fm.get_i64("access_count").map_or(0, |n| n.max(0) as u64),
            last_accessed: fm.get_str("last_accessed").and_then(parse_rfc3339),
            metadata,
            title,
            summary,
            body: doc.body.clone(),
        };
        Ok(memory)
    }
}

pub(crate) fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
