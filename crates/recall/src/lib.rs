//! Recall: a markdown-backed store for memories and tasks.
//!
//! Two linked entity types — memories (freeform notes) and tasks (work
//! items) — persist as per-entity markdown files with structured front
//! matter, organized by project. On top of the store sit a
//! bidirectional auto-linker connecting tasks to related memories, a
//! debounced filesystem watcher broadcasting change events, a backup
//! and integrity subsystem, and an optional vector index that degrades
//! cleanly to keyword-only retrieval.
//!
//! The [`Service`] is the assembled root: construct one over validated
//! [`paths::Roots`] and every subsystem is wired explicitly, no global
//! state.
//!
//! ```no_run
//! use recall::domain::{NewMemory, NewTask};
//! use recall::paths::Roots;
//! use recall::settings::Settings;
//! use recall::Service;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let roots = Roots::resolve(std::path::Path::new("."))?;
//!     let settings = Settings::load(&roots.data);
//!     let service = Service::open(roots, settings).await?;
//!
//!     let memory = service
//!         .add_memory(NewMemory {
//!             content: "API retry logic: exponential backoff with jitter".into(),
//!             tags: vec!["api".into(), "retry".into()],
//!             project: Some("payments".into()),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     let task = service
//!         .create_task(NewTask {
//!             title: "Implement retry with backoff".into(),
//!             project: Some("payments".into()),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     // The auto-linker connected them bidirectionally.
//!     assert!(task.memory_connections.iter().any(|c| c.memory_id == memory.id));
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod domain;
pub mod error;
pub mod events;
pub mod id;
pub mod linker;
pub mod paths;
pub mod service;
pub mod settings;
pub mod store;
pub mod vector;

mod watch;

pub use error::{Error, PathError, Result};
pub use service::{ContextDepth, HealthReport, Service, TaskContext};
