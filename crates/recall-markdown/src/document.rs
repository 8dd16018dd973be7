//! The document model: an ordered front-matter header plus markdown body.

use crate::parser;
use crate::value::{Scalar, Value};
use crate::warning::Warning;

/// An insertion-ordered front-matter header.
///
/// Keys keep the order they were inserted (or parsed) in, so rewriting a
/// document does not reshuffle fields another tool wrote. Lookup is
/// linear; headers are small (tens of keys at most).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrontMatter {
    entries: Vec<(String, Value)>,
}

impl FrontMatter {
    /// Create an empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of header entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the header has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether the header contains the key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// String scalar lookup.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_scalar()?.as_str()
    }

    /// Integer scalar lookup.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_scalar()?.as_i64()
    }

    /// Float scalar lookup (integers widen).
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_scalar()?.as_f64()
    }

    /// Boolean scalar lookup.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_scalar()?.as_bool()
    }

    /// List lookup.
    #[must_use]
    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        self.get(key)?.as_list()
    }

    /// Map lookup.
    #[must_use]
    pub fn get_map(&self, key: &str) -> Option<&[(String, Scalar)]> {
        self.get(key)?.as_map()
    }

    /// Insert or replace a value, keeping the key's existing position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Remove a key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn push_entry(&mut self, key: String, value: Value) {
        self.entries.push((key, value));
    }
}

impl<'a> IntoIterator for &'a FrontMatter {
    type Item = (&'a String, &'a Value);
    type IntoIter =
        std::iter::Map<std::slice::Iter<'a, (String, Value)>, fn(&'a (String, Value)) -> (&'a String, &'a Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl FromIterator<(String, Value)> for FrontMatter {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut fm = Self::new();
        for (k, v) in iter {
            fm.set(k, v);
        }
        fm
    }
}

/// A parsed document: structured header plus raw markdown body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// The structured header.
    pub front_matter: FrontMatter,
    /// The markdown body, exactly as it appeared after the header.
    pub body: String,
}

impl Document {
    /// Create a document from parts.
    #[must_use]
    pub fn new(front_matter: FrontMatter, body: impl Into<String>) -> Self {
        Self {
            front_matter,
            body: body.into(),
        }
    }

    /// Parse raw file text into a document.
    ///
    /// Parsing never fails: a file without a header yields an empty
    /// front matter and the whole text as body, and malformed header
    /// lines are dropped with a [`Warning`] each. An opening `---` with
    /// no closing delimiter is treated as having no header at all.
    #[must_use]
    pub fn parse(text: &str) -> (Self, Vec<Warning>) {
        parser::parse_document(text)
    }

    /// Render the document to its canonical on-disk text.
    ///
    /// Rendering is the inverse of [`Document::parse`] for any document
    /// that uses the restricted header subset: `parse(render(d)) == d`.
    #[must_use]
    pub fn render(&self) -> String {
        crate::emitter::render_document(self)
    }
}
