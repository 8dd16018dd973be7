//! Warning types for non-fatal issues during header parsing.
//!
//! Header parsing is resilient: a malformed line never fails the whole
//! document. Instead the line is dropped and a [`Warning`] is returned
//! alongside the parsed document so the store can surface it.

/// A non-fatal issue encountered while parsing a document header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A header line could not be parsed and was dropped.
    DroppedLine {
        /// The 1-based line number within the file.
        line_number: usize,
        /// The raw line content.
        line: String,
        /// Why the line was dropped.
        reason: String,
    },

    /// A nested map entry appeared under a key that already held a
    /// scalar value; the entry was dropped.
    OrphanedMapEntry {
        /// The 1-based line number within the file.
        line_number: usize,
        /// The indented key that had no map parent.
        key: String,
    },
}

impl Warning {
    /// Returns the line number associated with this warning.
    #[must_use]
    pub fn line_number(&self) -> usize {
        match self {
            Self::DroppedLine { line_number, .. } | Self::OrphanedMapEntry { line_number, .. } => {
                *line_number
            }
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DroppedLine {
                line_number,
                line,
                reason,
            } => write!(f, "line {line_number}: dropped {line:?}: {reason}"),
            Self::OrphanedMapEntry { line_number, key } => {
                write!(f, "line {line_number}: indented entry '{key}' has no map parent")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_line_reports_position() {
        let warning = Warning::DroppedLine {
            line_number: 7,
            line: ":::garbage".to_string(),
            reason: "no key separator".to_string(),
        };
        assert_eq!(warning.line_number(), 7);
        let text = warning.to_string();
        assert!(text.contains("line 7"));
        assert!(text.contains("garbage"));
    }

    #[test]
    fn orphaned_entry_reports_key() {
        let warning = Warning::OrphanedMapEntry {
            line_number: 3,
            key: "language".to_string(),
        };
        assert!(warning.to_string().contains("language"));
    }
}
