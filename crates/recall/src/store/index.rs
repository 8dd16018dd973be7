//! In-memory indexes over the on-disk entity set.
//!
//! The filesystem is the ground truth; everything here is a rebuildable
//! cache. Task hierarchy edges are mirrored into a petgraph `DiGraph`
//! (child -> parent) so that re-parenting can reject cycles.

use crate::domain::{
    Memory, MemoryCategory, MemoryId, MemoryStatus, Task, TaskId, TaskStatus,
};
use chrono::{DateTime, Utc};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Index entry for one memory.
#[derive(Debug, Clone)]
pub(crate) struct MemorySlot {
    pub file: PathBuf,
    pub serial: String,
    pub project: String,
    pub tags: Vec<String>,
    pub category: Option<MemoryCategory>,
    pub status: MemoryStatus,
    pub timestamp: DateTime<Utc>,
}

/// Index entry for one task.
#[derive(Debug, Clone)]
pub(crate) struct TaskSlot {
    pub file: PathBuf,
    pub serial: String,
    pub serial_number: u64,
    pub project: String,
    pub parent: Option<TaskId>,
    pub subtasks: Vec<TaskId>,
    pub status: TaskStatus,
}

/// A file that could not be parsed as an entity. Skipped in listings,
/// surfaced by the health check.
#[derive(Debug, Clone)]
pub struct CorruptFile {
    /// The unparseable file.
    pub path: PathBuf,
    /// What was wrong with it.
    pub reason: String,
}

/// The rebuildable in-memory index.
#[derive(Default)]
pub(crate) struct StoreIndex {
    pub memories: HashMap<MemoryId, MemorySlot>,
    pub memories_by_project: HashMap<String, HashSet<MemoryId>>,
    pub memories_by_tag: HashMap<String, HashSet<MemoryId>>,
    pub memories_by_category: HashMap<MemoryCategory, HashSet<MemoryId>>,
    pub memory_serial_max: u64,

    pub tasks: HashMap<TaskId, TaskSlot>,
    pub task_by_serial: HashMap<String, TaskId>,
    pub tasks_by_project: HashMap<String, HashSet<TaskId>>,
    pub tasks_by_status: HashMap<TaskStatus, HashSet<TaskId>>,
    pub task_serial_max: u64,

    hierarchy: DiGraph<TaskId, ()>,
    node_map: HashMap<TaskId, NodeIndex>,

    pub corrupt: Vec<CorruptFile>,
}

impl StoreIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // ===== Memories =====

    pub(crate) fn insert_memory(&mut self, memory: &Memory, file: PathBuf) {
        self.remove_memory(&memory.id);

        self.memories_by_project
            .entry(memory.project.clone())
            .or_default()
            .insert(memory.id.clone());
        for tag in &memory.tags {
            self.memories_by_tag
                .entry(tag.clone())
                .or_default()
                .insert(memory.id.clone());
        }
        if let Some(category) = memory.category {
            self.memories_by_category
                .entry(category)
                .or_default()
                .insert(memory.id.clone());
        }
        if let Some(number) = memory
            .serial
            .strip_prefix("MEM-")
            .and_then(|n| n.parse::<u64>().ok())
        {
            self.memory_serial_max = self.memory_serial_max.max(number);
        }

        self.memories.insert(
            memory.id.clone(),
            MemorySlot {
                file,
                serial: memory.serial.clone(),
                project: memory.project.clone(),
                tags: memory.tags.clone(),
                category: memory.category,
                status: memory.status,
                timestamp: memory.timestamp,
            },
        );
    }

    pub(crate) fn remove_memory(&mut self, id: &MemoryId) -> Option<MemorySlot> {
        let slot = self.memories.remove(id)?;
        if let Some(set) = self.memories_by_project.get_mut(&slot.project) {
            set.remove(id);
            if set.is_empty() {
                self.memories_by_project.remove(&slot.project);
            }
        }
        for tag in &slot.tags {
            if let Some(set) = self.memories_by_tag.get_mut(tag) {
                set.remove(id);
                if set.is_empty() {
                    self.memories_by_tag.remove(tag);
                }
            }
        }
        if let Some(category) = slot.category {
            if let Some(set) = self.memories_by_category.get_mut(&category) {
                set.remove(id);
                if set.is_empty() {
                    self.memories_by_category.remove(&category);
                }
            }
        }
        Some(slot)
    }

    /// Memory ids matching an optional project restriction.
    pub(crate) fn memory_ids(&self, project: Option<&str>) -> Vec<MemoryId> {
        match project {
            Some(project) => self
                .memories_by_project
                .get(project)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default(),
            None => self.memories.keys().cloned().collect(),
        }
    }

    /// The next memory serial (`MEM-XXXXXX`), advancing the counter.
    pub(crate) fn next_memory_serial(&mut self) -> String {
        self.memory_serial_max += 1;
        format!("MEM-{:06}", self.memory_serial_max)
    }

    // ===== Tasks =====

    pub(crate) fn insert_task(&mut self, task: &Task, file: PathBuf) {
        self.remove_task(&task.id);

        self.tasks_by_project
            .entry(task.project.clone())
            .or_default()
            .insert(task.id.clone());
        self.tasks_by_status
            .entry(task.status)
            .or_default()
            .insert(task.id.clone());
        self.task_by_serial
            .insert(task.serial.clone(), task.id.clone());

        let serial_number = task.serial_number().unwrap_or(0);
        self.task_serial_max = self.task_serial_max.max(serial_number);

        let node = self.ensure_node(&task.id);
        if let Some(parent) = &task.parent_task {
            let parent_node = self.ensure_node(parent);
            self.hierarchy.update_edge(node, parent_node, ());
        }

        self.tasks.insert(
            task.id.clone(),
            TaskSlot {
                file,
                serial: task.serial.clone(),
                serial_number,
                project: task.project.clone(),
                parent: task.parent_task.clone(),
                subtasks: task.subtasks.clone(),
                status: task.status,
            },
        );
    }

    pub(crate) fn remove_task(&mut self, id: &TaskId) -> Option<TaskSlot> {
        let slot = self.tasks.remove(id)?;
        self.task_by_serial.remove(&slot.serial);
        if let Some(set) = self.tasks_by_project.get_mut(&slot.project) {
            set.remove(id);
            if set.is_empty() {
                self.tasks_by_project.remove(&slot.project);
            }
        }
        if let Some(set) = self.tasks_by_status.get_mut(&slot.status) {
            set.remove(id);
            if set.is_empty() {
                self.tasks_by_status.remove(&slot.status);
            }
        }
        if let Some(node) = self.node_map.remove(id) {
            // remove_node swaps the last node into the freed index, so
            // the id -> index map must be rebuilt afterwards.
            self.hierarchy.remove_node(node);
            self.rebuild_node_map();
        }
        Some(slot)
    }

    /// Whether making `parent` the parent of `child` would create a
    /// cycle in the hierarchy (i.e. `child` is already an ancestor of
    /// `parent`, or they are the same task).
    pub(crate) fn would_create_cycle(&mut self, child: &TaskId, parent: &TaskId) -> bool {
        if child == parent {
            return true;
        }
        let (Some(&child_node), Some(&parent_node)) =
            (self.node_map.get(child), self.node_map.get(parent))
        else {
            return false;
        };
        // Edges run child -> parent, so an existing path from `parent`
        // up to `child` means `child` is an ancestor of `parent`.
        has_path_connecting(&self.hierarchy, parent_node, child_node, None)
    }

    /// Task ids matching optional project/status restrictions.
    pub(crate) fn task_ids(
        &self,
        project: Option<&str>,
        status: Option<TaskStatus>,
    ) -> Vec<TaskId> {
        let by_project: Option<&HashSet<TaskId>> =
            project.and_then(|p| self.tasks_by_project.get(p));
        let by_status: Option<&HashSet<TaskId>> =
            status.and_then(|s| self.tasks_by_status.get(&s));

        match (project, status) {
            (Some(_), Some(_)) => match (by_project, by_status) {
                (Some(a), Some(b)) => a.intersection(b).cloned().collect(),
                _ => Vec::new(),
            },
            (Some(_), None) => by_project.map(|s| s.iter().cloned().collect()).unwrap_or_default(),
            (None, Some(_)) => by_status.map(|s| s.iter().cloned().collect()).unwrap_or_default(),
            (None, None) => self.tasks.keys().cloned().collect(),
        }
    }

    /// The next task serial (`TASK-NNNNN`), advancing the counter.
    pub(crate) fn next_task_serial(&mut self) -> String {
        self.task_serial_max += 1;
        format!("TASK-{:05}", self.task_serial_max)
    }

    fn ensure_node(&mut self, id: &TaskId) -> NodeIndex {
        if let Some(&node) = self.node_map.get(id) {
            return node;
        }
        let node = self.hierarchy.add_node(id.clone());
        self.node_map.insert(id.clone(), node);
        node
    }

    fn rebuild_node_map(&mut self) {
        self.node_map = self
            .hierarchy
            .node_indices()
            .map(|node| (self.hierarchy[node].clone(), node))
            .collect();
    }
}
