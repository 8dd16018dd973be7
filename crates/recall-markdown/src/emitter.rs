//! Canonical emission of documents.

use crate::document::Document;
use crate::value::{quote, Value};
use std::fmt::Write;

/// Render a document to its canonical on-disk text.
///
/// Output is always UTF-8 with LF line endings: `---`, one line per
/// header entry in insertion order, `---`, a blank separator line, then
/// the body verbatim.
pub(crate) fn render_document(doc: &Document) -> String {
    let mut out = String::with_capacity(doc.body.len() + doc.front_matter.len() * 32 + 16);

    out.push_str("---\n");
    for (key, value) in doc.front_matter.iter() {
        render_entry(&mut out, key, value);
    }
    out.push_str("---\n");
    out.push('\n');
    out.push_str(&doc.body);

    out
}

fn render_entry(out: &mut String, key: &str, value: &Value) {
    match value {
        Value::Scalar(scalar) => {
            writeln!(out, "{key}: {scalar}").expect("writing to String cannot fail");
        }
        Value::List(items) => {
            out.push_str(key);
            out.push_str(": [");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&quote(item));
            }
            out.push_str("]\n");
        }
        Value::Map(entries) => {
            out.push_str(key);
            out.push_str(":\n");
            for (sub_key, scalar) in entries {
                writeln!(out, "  {sub_key}: {scalar}").expect("writing to String cannot fail");
            }
        }
    }
}
