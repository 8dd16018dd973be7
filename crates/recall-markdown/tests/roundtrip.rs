//! Round-trip property: for every document built from the restricted
//! header subset, `parse(render(d)) == d`.

use proptest::prelude::*;
use recall_markdown::{Document, FrontMatter, Scalar, Value};

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        ".*".prop_map(Scalar::String),
        any::<i64>().prop_map(Scalar::Integer),
        (-1.0e6..1.0e6f64).prop_map(Scalar::Float),
        any::<bool>().prop_map(Scalar::Bool),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        scalar_strategy().prop_map(Value::Scalar),
        prop::collection::vec(".*", 0..6).prop_map(Value::List),
        prop::collection::vec((key_strategy(), scalar_strategy()), 0..5)
            .prop_map(|entries| Value::Map(dedup_keys(entries))),
    ]
}

fn dedup_keys(entries: Vec<(String, Scalar)>) -> Vec<(String, Scalar)> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|(k, _)| seen.insert(k.clone()))
        .collect()
}

fn front_matter_strategy() -> impl Strategy<Value = FrontMatter> {
    prop::collection::vec((key_strategy(), value_strategy()), 0..10).prop_map(|entries| {
        // FromIterator deduplicates via set(), keeping first position.
        entries.into_iter().collect()
    })
}

proptest! {
    #[test]
    fn parse_render_identity(
        front_matter in front_matter_strategy(),
        body in ".*",
    ) {
        let doc = Document::new(front_matter, body);
        let rendered = doc.render();
        let (reparsed, warnings) = Document::parse(&rendered);
        prop_assert!(warnings.is_empty(), "warnings: {warnings:?}");
        prop_assert_eq!(doc, reparsed);
    }

    #[test]
    fn render_is_stable(
        front_matter in front_matter_strategy(),
        body in ".*",
    ) {
        let doc = Document::new(front_matter, body);
        let once = doc.render();
        let (reparsed, _) = Document::parse(&once);
        let twice = reparsed.render();
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn representative_memory_document_round_trips() {
    let text = concat!(
        "---\n",
        "id: mem-8k2p\n",
        "serial: MEM-000042\n",
        "timestamp: 2025-06-01T09:30:00Z\n",
        "complexity: 3\n",
        "category: code\n",
        "project: payments\n",
        "tags: [\"api\", \"retry\"]\n",
        "priority: high\n",
        "status: active\n",
        "related_memories: []\n",
        "access_count: 7\n",
        "last_accessed: 2025-06-03T10:00:00Z\n",
        "metadata:\n",
        "  content_type: code\n",
        "  language: rust\n",
        "  size: 512\n",
        "  mermaid_diagram: false\n",
        "---\n",
        "\n",
        "API retry logic: exponential backoff with jitter.\n",
        "\n",
        "```rust\n",
        "fn backoff(attempt: u32) -> Duration { todo!() }\n",
        "```\n",
    );

    let (doc, warnings) = Document::parse(text);
    assert!(warnings.is_empty(), "{warnings:?}");
    assert_eq!(doc.render(), text);
}

#[test]
fn unknown_keys_survive_a_rewrite() {
    let text = concat!(
        "---\n",
        "id: task-1a2b\n",
        "x_external_sync: jira-4711\n",
        "title: Ship the thing\n",
        "---\n",
        "\n",
        "Body.\n",
    );

    let (mut doc, _) = Document::parse(text);
    doc.front_matter.set("title", Scalar::from("Ship it now"));
    let rendered = doc.render();

    // The unknown key is still present, in its original position.
    let id_pos = rendered.find("id:").unwrap();
    let unknown_pos = rendered.find("x_external_sync: jira-4711").unwrap();
    let title_pos = rendered.find("title: Ship it now").unwrap();
    assert!(id_pos < unknown_pos && unknown_pos < title_pos);
}
