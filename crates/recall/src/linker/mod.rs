//! The bidirectional auto-linker.
//!
//! On task create (with `auto_link`) and on task mutations that touch
//! title/description/tags/project, the linker retrieves candidate
//! memories (keyword scan plus vector neighbors when available), scores
//! them with the weighted multi-factor function in [`scoring`], keeps
//! those above the threshold, caps the auto set, and persists the
//! connections on both sides through the store.
//!
//! Per-candidate failures are skips; only a total failure of the
//! pipeline propagates. The deadline is checked between candidates and
//! aborts cleanly with whatever has been linked so far unpersisted.

pub mod scoring;
pub mod terms;

use crate::domain::{ConnectionType, MemoryConnection, Task};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::vector::VectorIndex;
use scoring::{
    connection_type_for, score_candidate, ScoredCandidate, MAX_AUTO_LINKS, SCORE_THRESHOLD,
    VECTOR_TOP_K,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;

/// The auto-linking engine.
pub struct Linker {
    vector: Arc<dyn VectorIndex>,
}

impl Linker {
    /// Create a linker over the given (possibly degraded) vector index.
    #[must_use]
    pub fn new(vector: Arc<dyn VectorIndex>) -> Self {
        Self { vector }
    }

    /// Compute and persist a task's memory connections.
    ///
    /// With `auto` false only the manual connections are written (the
    /// caller attached memories but opted out of auto-linking). Manual
    /// memories from the task's `manual_memories` list are always
    /// written with `connection_type = manual, relevance = 1.0` and are
    /// never evicted by the auto-link cap.
    ///
    /// Returns the task as persisted, with its connections resolved.
    ///
    /// # Errors
    ///
    /// `Timeout` when the deadline expires before persistence; store
    /// errors from the final bidirectional write.
    pub async fn link_task(
        &self,
        store: &Store,
        task: &Task,
        auto: bool,
        deadline: Option<Instant>,
    ) -> Result<Task> {
        let task_terms = terms::extract_terms(&format!(
            "{} {} {}",
            task.title,
            task.description,
            task.tags.join(" ")
        ));

        let manual: HashSet<_> = task.manual_memories.iter().cloned().collect();

        let mut scored: Vec<ScoredCandidate> = Vec::new();
        if auto {
            let semantic = self.vector_candidates(task).await;
            let candidate_ids = {
                let index = store.index.read().await;
                index.memory_ids(None)
            };

            for id in candidate_ids {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(Error::Timeout {
                        operation: "auto-link",
                    });
                }
                if manual.contains(&id) {
                    continue;
                }
                let memory = match store.peek_memory(&id).await {
                    Ok(memory) => memory,
                    Err(e) => {
                        tracing::debug!(%id, error = %e, "skipping unreadable candidate");
                        continue;
                    }
                };
                let cosine = semantic.get(id.as_str()).copied().unwrap_or(0.0);
                let candidate = score_candidate(task, &task_terms, &memory, cosine);
                if candidate.score >= SCORE_THRESHOLD {
                    scored.push(candidate);
                }
            }
        }

        // Rank: score descending, newer memory first, smaller id last.
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.memory.timestamp.cmp(&a.memory.timestamp))
                .then_with(|| a.memory.id.as_str().cmp(b.memory.id.as_str()))
        });
        scored.truncate(MAX_AUTO_LINKS);

        let mut connections = Vec::with_capacity(manual.len() + scored.len());
        for id in &task.manual_memories {
            match store.peek_memory(id).await {
                Ok(memory) => connections.push(MemoryConnection {
                    memory_id: memory.id.clone(),
                    memory_serial: memory.serial.clone(),
                    connection_type: ConnectionType::Manual,
                    relevance: 1.0,
                    matched_terms: Vec::new(),
                }),
                Err(e) => {
                    tracing::warn!(memory = %id, error = %e, "manual memory did not resolve; skipping");
                }
            }
        }
        for candidate in scored {
            connections.push(MemoryConnection {
                memory_id: candidate.memory.id.clone(),
                memory_serial: candidate.memory.serial.clone(),
                connection_type: connection_type_for(&candidate.memory, task.created),
                relevance: round4(candidate.score),
                matched_terms: candidate.matched_terms,
            });
        }

        tracing::debug!(
            task = %task.id,
            connections = connections.len(),
            semantic = self.vector.is_enabled(),
            "auto-link resolved"
        );
        store.set_task_connections(&task.id, connections).await
    }

    /// Top-K vector neighbors for the task text, as id -> cosine.
    /// Empty when the index is degraded or errors (per-candidate skip
    /// policy).
    async fn vector_candidates(&self, task: &Task) -> HashMap<String, f64> {
        if !self.vector.is_enabled() {
            return HashMap::new();
        }
        let text = format!("{} {}", task.title, task.description);
        let embedded = match self.vector.embed(&text).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed; keyword-only for this link pass");
                return HashMap::new();
            }
        };
        match self.vector.query(&embedded, VECTOR_TOP_K).await {
            Ok(neighbors) => neighbors
                .into_iter()
                .map(|(id, cosine)| (id, f64::from(cosine)))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "vector query failed; keyword-only for this link pass");
                HashMap::new()
            }
        }
    }
}

/// Round a score to the precision persisted in front matter.
fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_matches_front_matter_precision() {
        assert!((round4(0.626_66) - 0.6267).abs() < 1e-12);
        assert!((round4(1.0) - 1.0).abs() < f64::EPSILON);
    }
}
