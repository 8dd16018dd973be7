//! Resilient line-oriented parser for the front-matter header.

use crate::document::{Document, FrontMatter};
use crate::value::{unescape, Scalar, Value};
use crate::warning::Warning;

const DELIMITER: &str = "---";

/// Parse raw file text into a document plus non-fatal warnings.
pub(crate) fn parse_document(text: &str) -> (Document, Vec<Warning>) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some(rest) = strip_opening_delimiter(text) else {
        return (Document::new(FrontMatter::new(), text), Vec::new());
    };

    // Find the closing delimiter line; without one the file has no header.
    let Some((header, body)) = split_at_closing_delimiter(rest) else {
        return (Document::new(FrontMatter::new(), text), Vec::new());
    };

    let mut warnings = Vec::new();
    let front_matter = parse_header(header, &mut warnings);

    // A single blank line conventionally separates header from body.
    let body = body.strip_prefix('\n').unwrap_or(body);

    (Document::new(front_matter, body), warnings)
}

fn strip_opening_delimiter(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(DELIMITER)?;
    rest.strip_prefix('\n')
        .or_else(|| rest.strip_prefix("\r\n"))
}

fn split_at_closing_delimiter(rest: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == DELIMITER {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((header, body));
        }
        offset += line.len();
    }
    None
}

fn parse_header(header: &str, warnings: &mut Vec<Warning>) -> FrontMatter {
    let mut fm = FrontMatter::new();
    // Key of the map currently being collected, if any.
    let mut open_map: Option<String> = None;

    for (index, raw_line) in header.lines().enumerate() {
        // Line 1 is the opening delimiter.
        let line_number = index + 2;
        let line = raw_line.trim_end_matches('\r');

        if line.trim().is_empty() {
            open_map = None;
            continue;
        }

        if let Some(stripped) = line.strip_prefix("  ") {
            // Indented entry: belongs to the most recent map key.
            match (&open_map, split_key_value(stripped)) {
                (Some(map_key), Some((sub_key, raw_value))) => {
                    let scalar = parse_scalar(raw_value);
                    append_map_entry(&mut fm, map_key, sub_key, scalar);
                }
                (Some(_), None) | (None, _) => {
                    warnings.push(Warning::OrphanedMapEntry {
                        line_number,
                        key: stripped.trim().to_string(),
                    });
                }
            }
            continue;
        }

        open_map = None;

        if line.trim_start().starts_with('#') {
            warnings.push(Warning::DroppedLine {
                line_number,
                line: line.to_string(),
                reason: "comment".to_string(),
            });
            continue;
        }

        let Some((key, raw_value)) = split_key_value(line) else {
            warnings.push(Warning::DroppedLine {
                line_number,
                line: line.to_string(),
                reason: "no key separator".to_string(),
            });
            continue;
        };

        if raw_value.is_empty() {
            // `key:` opens a nested map.
            fm.push_entry(key.to_string(), Value::Map(Vec::new()));
            open_map = Some(key.to_string());
        } else if raw_value.starts_with('[') {
            match parse_flow_list(raw_value) {
                Some(items) => fm.push_entry(key.to_string(), Value::List(items)),
                None => warnings.push(Warning::DroppedLine {
                    line_number,
                    line: line.to_string(),
                    reason: "unterminated list".to_string(),
                }),
            }
        } else {
            fm.push_entry(key.to_string(), Value::Scalar(parse_scalar(raw_value)));
        }
    }

    fm
}

fn append_map_entry(fm: &mut FrontMatter, map_key: &str, sub_key: &str, scalar: Scalar) {
    // Fetch, extend, store back; headers are small.
    let mut entries = match fm.get(map_key) {
        Some(Value::Map(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    entries.push((sub_key.to_string(), scalar));
    fm.set(map_key.to_string(), Value::Map(entries));
}

/// Split a header line into `(key, value)` at the first colon.
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let key = line[..colon].trim();
    if key.is_empty() {
        return None;
    }
    let value = line[colon + 1..].trim();
    Some((key, value))
}

fn parse_scalar(raw: &str) -> Scalar {
    if let Some(inner) = strip_quotes(raw) {
        Scalar::String(unescape(inner))
    } else {
        Scalar::from_raw(raw)
    }
}

fn strip_quotes(raw: &str) -> Option<&str> {
    let inner = raw.strip_prefix('"')?;
    let inner = inner.strip_suffix('"')?;
    // Reject a bare `"` which would strip to a dangling escape.
    if inner.ends_with('\\') && !inner.ends_with("\\\\") {
        return None;
    }
    Some(inner)
}

/// Parse `["a", "b"]` into its items. Tolerates unquoted items and a
/// trailing comma; returns `None` when the closing bracket is missing.
fn parse_flow_list(raw: &str) -> Option<Vec<String>> {
    let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in inner.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => {
                in_quotes = !in_quotes;
                current.push('"');
            }
            ',' if !in_quotes => {
                push_item(&mut items, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if in_quotes {
        return None;
    }
    push_item(&mut items, &current);
    Some(items)
}

fn push_item(items: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    if let Some(inner) = strip_quotes(trimmed) {
        items.push(unescape(inner));
    } else {
        items.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_has_no_header() {
        let (doc, warnings) = parse_document("just a note\nwith lines\n");
        assert!(doc.front_matter.is_empty());
        assert_eq!(doc.body, "just a note\nwith lines\n");
        assert!(warnings.is_empty());
    }

    #[test]
    fn unterminated_header_falls_back_to_body() {
        let text = "---\nid: mem-1\nno closing delimiter\n";
        let (doc, warnings) = parse_document(text);
        assert!(doc.front_matter.is_empty());
        assert_eq!(doc.body, text);
        assert!(warnings.is_empty());
    }

    #[test]
    fn parses_scalars_lists_and_maps() {
        let text = concat!(
            "---\n",
            "id: mem-a3f8\n",
            "complexity: 2\n",
            "priority: high\n",
            "tags: [\"api\", \"retry logic\"]\n",
            "metadata:\n",
            "  content_type: code\n",
            "  size: 128\n",
            "  mermaid_diagram: false\n",
            "---\n",
            "\n",
            "Body text.\n"
        );
        let (doc, warnings) = parse_document(text);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(doc.front_matter.get_str("id"), Some("mem-a3f8"));
        assert_eq!(doc.front_matter.get_i64("complexity"), Some(2));
        assert_eq!(
            doc.front_matter.get_list("tags"),
            Some(&["api".to_string(), "retry logic".to_string()][..])
        );
        let metadata = doc.front_matter.get_map("metadata").unwrap();
        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata[1], ("size".to_string(), Scalar::Integer(128)));
        assert_eq!(doc.body, "Body text.\n");
    }

    #[test]
    fn malformed_lines_are_dropped_with_warnings() {
        let text = "---\nid: mem-1\ngarbage line\ntags: [\"open\n---\nbody\n";
        let (doc, warnings) = parse_document(text);
        assert_eq!(doc.front_matter.get_str("id"), Some("mem-1"));
        assert!(!doc.front_matter.contains_key("tags"));
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].line_number(), 3);
    }

    #[test]
    fn indented_line_without_map_parent_warns() {
        let text = "---\nid: mem-1\n\n  stray: value\n---\nbody\n";
        let (doc, warnings) = parse_document(text);
        assert_eq!(doc.front_matter.len(), 1);
        assert!(matches!(warnings[0], Warning::OrphanedMapEntry { .. }));
    }

    #[test]
    fn quoted_scalars_preserve_type_markers() {
        let text = "---\nliteral: \"42\"\nnumber: 42\n---\n";
        let (doc, _) = parse_document(text);
        assert_eq!(doc.front_matter.get_str("literal"), Some("42"));
        assert_eq!(doc.front_matter.get_i64("number"), Some(42));
    }

    #[test]
    fn empty_list_and_trailing_comma() {
        let text = "---\na: []\nb: [\"x\", ]\n---\n";
        let (doc, warnings) = parse_document(text);
        assert!(warnings.is_empty());
        assert_eq!(doc.front_matter.get_list("a"), Some(&[][..]));
        assert_eq!(doc.front_matter.get_list("b"), Some(&["x".to_string()][..]));
    }

    #[test]
    fn crlf_input_is_tolerated() {
        let text = "---\r\nid: mem-1\r\n---\r\nbody\r\n";
        let (doc, warnings) = parse_document(text);
        assert!(warnings.is_empty());
        assert_eq!(doc.front_matter.get_str("id"), Some("mem-1"));
    }
}
