//! Multi-factor relevance scoring for task-to-memory candidates.

use super::terms::is_technical;
use crate::domain::{ConnectionType, Memory, MemoryCategory, Task};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Weight of vector cosine similarity (0 when the index is degraded).
pub const WEIGHT_SEMANTIC: f64 = 0.40;
/// Weight of an exact project match.
pub const WEIGHT_PROJECT: f64 = 0.25;
/// Weight of an exact category match.
pub const WEIGHT_CATEGORY: f64 = 0.15;
/// Weight of tag-set Jaccard overlap.
pub const WEIGHT_TAGS: f64 = 0.15;
/// Weight of keyword density (matched / extracted terms).
pub const WEIGHT_KEYWORD: f64 = 0.10;
/// Bonus when a technical term matches on both sides.
pub const WEIGHT_TECHNICAL: f64 = 0.08;
/// Floor of the time-proximity contribution.
pub const WEIGHT_TIME_BASE: f64 = 0.04;
/// Decaying part of the time-proximity contribution; the factor spans
/// `[WEIGHT_TIME_BASE, WEIGHT_TIME_BASE + WEIGHT_TIME_RANGE]`.
pub const WEIGHT_TIME_RANGE: f64 = 0.04;

/// Time-proximity half-life in days.
pub const TIME_HALF_LIFE_DAYS: f64 = 30.0;

/// Candidates below this score are discarded.
pub const SCORE_THRESHOLD: f64 = 0.3;

/// Maximum number of auto-assigned links per task. Manual connections
/// do not count against it.
pub const MAX_AUTO_LINKS: usize = 5;

/// How many nearest neighbors the vector index is asked for.
pub const VECTOR_TOP_K: usize = 20;

/// Memories older than this (relative to task creation) stop counting
/// as `implementation` material.
pub const IMPLEMENTATION_WINDOW_DAYS: i64 = 14;

/// A scored candidate.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    /// The candidate memory.
    pub memory: Memory,
    /// Combined weighted score, clamped to `[0, 1]`.
    pub score: f64,
    /// Extracted task terms found in the memory.
    pub matched_terms: Vec<String>,
}

/// Score one candidate memory against a task.
///
/// `semantic` is the vector cosine for this memory (0 when the index is
/// unavailable or the memory was not a vector candidate).
#[must_use]
pub fn score_candidate(
    task: &Task,
    terms: &[String],
    memory: &Memory,
    semantic: f64,
) -> ScoredCandidate {
    let haystack = memory_haystack(memory);

    let matched_terms: Vec<String> = terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .cloned()
        .collect();

    let mut score = WEIGHT_SEMANTIC * semantic.clamp(0.0, 1.0);

    if task.project == memory.project {
        score += WEIGHT_PROJECT;
    }
    if category_matches(task, memory) {
        score += WEIGHT_CATEGORY;
    }
    score += WEIGHT_TAGS * tag_jaccard(&task.tags, &memory.tags);
    if !terms.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let density = matched_terms.len() as f64 / terms.len() as f64;
        score += WEIGHT_KEYWORD * density;
    }
    if matched_terms.iter().any(|t| is_technical(t)) {
        score += WEIGHT_TECHNICAL;
    }
    score += time_proximity(task.created, memory.timestamp);

    ScoredCandidate {
        memory: memory.clone(),
        score: score.clamp(0.0, 1.0),
        matched_terms,
    }
}

/// The connection type for an auto link. `manual` is never assigned
/// here.
#[must_use]
pub fn connection_type_for(memory: &Memory, task_created: DateTime<Utc>) -> ConnectionType {
    match memory.category {
        Some(MemoryCategory::Research | MemoryCategory::Conversations) => ConnectionType::Research,
        Some(MemoryCategory::Code) => {
            let age = task_created - memory.timestamp;
            if age >= chrono::Duration::zero()
                && age < chrono::Duration::days(IMPLEMENTATION_WINDOW_DAYS)
            {
                ConnectionType::Implementation
            } else {
                ConnectionType::Reference
            }
        }
        _ => ConnectionType::Reference,
    }
}

/// Searchable lowercase text of a memory: body, title, tags, category.
fn memory_haystack(memory: &Memory) -> String {
    let mut haystack = memory.body.to_lowercase();
    if let Some(title) = &memory.title {
        haystack.push(' ');
        haystack.push_str(&title.to_lowercase());
    }
    for tag in &memory.tags {
        haystack.push(' ');
        haystack.push_str(&tag.to_lowercase());
    }
    if let Some(category) = memory.category {
        haystack.push(' ');
        haystack.push_str(category.as_str());
    }
    haystack
}

fn category_matches(task: &Task, memory: &Memory) -> bool {
    match (task.category, memory.category) {
        (Some(a), Some(b)) => a.as_str() == b.as_str(),
        _ => false,
    }
}

fn tag_jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<String> = a.iter().map(|t| t.to_lowercase()).collect();
    let set_b: HashSet<String> = b.iter().map(|t| t.to_lowercase()).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}

/// Exponential decay over the age gap, half-life 30 days. Spans
/// `(WEIGHT_TIME_BASE, WEIGHT_TIME_BASE + WEIGHT_TIME_RANGE]`.
fn time_proximity(task_created: DateTime<Utc>, memory_timestamp: DateTime<Utc>) -> f64 {
    let delta_days = (task_created - memory_timestamp).num_seconds().abs() as f64 / 86_400.0;
    let decay = 0.5_f64.powf(delta_days / TIME_HALF_LIFE_DAYS);
    WEIGHT_TIME_BASE + WEIGHT_TIME_RANGE * decay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        now_secs, MemoryId, MemoryMetadata, MemoryPriority, MemoryStatus, TaskCategory, TaskId,
        TaskPriority, TaskStatus,
    };

    fn make_memory(project: &str, category: Option<MemoryCategory>, tags: &[&str]) -> Memory {
        Memory {
            id: MemoryId::new("mem-1"),
            serial: "MEM-000001".to_string(),
            timestamp: now_secs(),
            complexity: 1,
            category,
            project: project.to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
            priority: MemoryPriority::Medium,
            status: MemoryStatus::Active,
            related_memories: vec![],
            task_connections: vec![],
            access_count: 0,
            last_accessed: None,
            metadata: MemoryMetadata::default(),
            title: None,
            summary: None,
            body: "API retry logic: exponential backoff with jitter".to_string(),
        }
    }

    fn make_task(project: &str, category: Option<TaskCategory>, tags: &[&str]) -> Task {
        Task {
            id: TaskId::new("task-1"),
            serial: "TASK-00001".to_string(),
            title: "Implement retry with backoff".to_string(),
            description: String::new(),
            project: project.to_string(),
            category,
            priority: TaskPriority::Medium,
            status: TaskStatus::Todo,
            parent_task: None,
            subtasks: vec![],
            tags: tags.iter().map(ToString::to_string).collect(),
            memory_connections: vec![],
            manual_memories: vec![],
            created: now_secs(),
            updated: now_secs(),
            completed: None,
        }
    }

    #[test]
    fn same_project_and_category_clear_the_threshold_without_semantics() {
        let task = make_task("p1", Some(TaskCategory::Code), &[]);
        let memory = make_memory("p1", Some(MemoryCategory::Code), &["api", "retry"]);
        let terms = super::super::terms::extract_terms(&task.title);

        let scored = score_candidate(&task, &terms, &memory, 0.0);
        assert!(scored.score >= 0.55, "score was {}", scored.score);
        assert!(scored.matched_terms.contains(&"retry".to_string()));
        assert!(scored.matched_terms.contains(&"backoff".to_string()));
    }

    #[test]
    fn unrelated_memory_stays_below_threshold() {
        let task = make_task("p1", Some(TaskCategory::Code), &[]);
        let mut memory = make_memory("p2", Some(MemoryCategory::Personal), &[]);
        memory.body = "Grocery list: milk, eggs, bread".to_string();
        let terms = super::super::terms::extract_terms(&task.title);

        let scored = score_candidate(&task, &terms, &memory, 0.0);
        assert!(scored.score < SCORE_THRESHOLD, "score was {}", scored.score);
        assert!(scored.matched_terms.is_empty());
    }

    #[test]
    fn semantic_similarity_dominates_when_present() {
        let task = make_task("p1", None, &[]);
        let memory = make_memory("p2", None, &[]);
        let terms = vec!["unmatched".to_string()];

        let without = score_candidate(&task, &terms, &memory, 0.0);
        let with = score_candidate(&task, &terms, &memory, 0.9);
        assert!((with.score - without.score - 0.36).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped_to_one() {
        let task = make_task("p1", Some(TaskCategory::Code), &["api", "retry"]);
        let memory = make_memory("p1", Some(MemoryCategory::Code), &["api", "retry"]);
        let terms = super::super::terms::extract_terms("api retry backoff exponential jitter");

        let scored = score_candidate(&task, &terms, &memory, 1.0);
        assert!(scored.score <= 1.0);
        assert!(scored.score > 0.95);
    }

    #[test]
    fn tag_jaccard_cases() {
        assert!((tag_jaccard(&[], &[]) - 0.0).abs() < f64::EPSILON);
        let a = vec!["api".to_string(), "retry".to_string()];
        let b = vec!["API".to_string(), "cache".to_string()];
        // Intersection {api}, union {api, retry, cache}.
        assert!((tag_jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn time_proximity_decays_with_half_life() {
        let now = now_secs();
        let fresh = time_proximity(now, now);
        assert!((fresh - 0.08).abs() < 1e-9);

        let month_old = time_proximity(now, now - chrono::Duration::days(30));
        assert!((month_old - 0.06).abs() < 1e-3);

        let ancient = time_proximity(now, now - chrono::Duration::days(3650));
        assert!(ancient > 0.04 - 1e-9 && ancient < 0.0401);
    }

    #[test]
    fn connection_type_heuristics() {
        let now = now_secs();

        let research = make_memory("p1", Some(MemoryCategory::Research), &[]);
        assert_eq!(connection_type_for(&research, now), ConnectionType::Research);

        let conversations = make_memory("p1", Some(MemoryCategory::Conversations), &[]);
        assert_eq!(
            connection_type_for(&conversations, now),
            ConnectionType::Research
        );

        let mut code = make_memory("p1", Some(MemoryCategory::Code), &[]);
        code.timestamp = now - chrono::Duration::days(3);
        assert_eq!(connection_type_for(&code, now), ConnectionType::Implementation);

        code.timestamp = now - chrono::Duration::days(60);
        assert_eq!(connection_type_for(&code, now), ConnectionType::Reference);

        let plain = make_memory("p1", None, &[]);
        assert_eq!(connection_type_for(&plain, now), ConnectionType::Reference);
    }
}
