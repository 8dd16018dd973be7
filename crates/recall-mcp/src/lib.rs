//! MCP gateway for the recall memory and task store.
//!
//! This crate exposes the recall core to AI assistants over the MCP
//! (Model Context Protocol) using the `rmcp` crate for protocol
//! handling and stdio transport.
//!
//! # Tools
//!
//! ## Memories
//! - `add_memory` - Store a note with tags, category, project, title
//! - `get_memory` - Fetch a full memory record (bumps access counters)
//! - `list_memories` - List, most recent first
//! - `search_memories` - Ranked substring search
//! - `delete_memory` - Idempotent delete with connection cascade
//!
//! ## Tasks
//! - `create_task` - Create a task; auto-links related memories
//! - `update_task` - Patch fields with status-transition validation
//! - `list_tasks` - List with project/status filters
//! - `get_task_context` - Task plus linked memories (and subtasks, deep)
//! - `delete_task` - Idempotent delete with hierarchy/link cascade
//!
//! ## Diagnostics
//! - `test_tool` - Echo liveness probe

pub mod context;
pub mod error;
pub mod models;
pub mod server;
pub mod tools;

pub use context::Context;
pub use error::{Error, Result};
pub use server::RecallMcpServer;
