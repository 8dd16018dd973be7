//! Front-matter markdown document codec for recall.
//!
//! This crate provides the on-disk document model shared by the recall
//! memory and task stores: a markdown body preceded by a structured
//! header delimited by `---` lines.
//!
//! # Header format
//!
//! The header is a restricted, YAML-like subset:
//!
//! - scalar values (`key: value`) — strings, integers, floats, booleans
//! - bracketed flow lists of quoted strings (`tags: ["api", "retry"]`)
//! - a single level of nested maps via two-space indentation
//!   (`metadata:` followed by indented `key: value` lines)
//!
//! The codec is lossless for known fields and round-trip stable:
//! parsing an emitted document yields an equal header. Unknown keys are
//! preserved verbatim in insertion order so third-party tooling that
//! writes extra fields is never destroyed by a rewrite.
//!
//! # Crash safety
//!
//! [`write_atomic`] provides the temp-file-then-rename write pattern used
//! for every document mutation. The rename is the commit point: a crash
//! mid-write leaves at most a stray `.tmp` file and never a partial
//! target.
//!
//! # Example
//!
//! ```
//! use recall_markdown::Document;
//!
//! let text = "---\nid: mem-a3f8\ntags: [\"api\", \"retry\"]\n---\n\nNote body.\n";
//! let (doc, warnings) = Document::parse(text);
//! assert!(warnings.is_empty());
//! assert_eq!(doc.front_matter.get_str("id"), Some("mem-a3f8"));
//! assert_eq!(doc.body.trim(), "Note body.");
//!
//! let rendered = doc.render();
//! let (reparsed, _) = Document::parse(&rendered);
//! assert_eq!(doc, reparsed);
//! ```

pub mod atomic;
pub mod document;
pub mod parser;
pub mod value;
pub mod warning;

mod emitter;

pub use atomic::write_atomic;
pub use document::{Document, FrontMatter};
pub use value::{Scalar, Value};
pub use warning::Warning;
