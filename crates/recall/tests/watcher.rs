//! Watcher and change-bus integration tests.
//!
//! These drive real filesystem mutations and assert on the debounced,
//! translated events. Waits are generous because platform watchers
//! deliver asynchronously.

mod common;

use common::keyword_only_service;
use recall::domain::NewMemory;
use recall::events::{ChangeAction, ChangeEvent, DeliveredEvent, Subscription};
use std::time::Duration;

async fn next_event(sub: &mut Subscription, wait: Duration) -> Option<DeliveredEvent> {
    tokio::time::timeout(wait, sub.recv()).await.ok().flatten()
}

/// Drain everything the watcher delivers within the window.
async fn drain(sub: &mut Subscription, window: Duration) -> Vec<DeliveredEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(sub, window).await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn store_mutations_surface_as_change_events() {
    let (_temp, service) = keyword_only_service().await;
    let mut sub = service.subscribe();

    let memory = service
        .add_memory(NewMemory {
            content: "watched note".to_string(),
            project: Some("p1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let events = drain(&mut sub, Duration::from_millis(800)).await;
    assert!(
        events.iter().any(|e| {
            matches!(&e.event, ChangeEvent::MemoryChange(data)
                if data.action == ChangeAction::Add
                    && data.project.as_deref() == Some("p1"))
        }),
        "no add event for the new memory: {events:?}"
    );

    // The id resolves through the index for files the store knows.
    let with_id = events.iter().find_map(|e| match &e.event {
        ChangeEvent::MemoryChange(data) => data.id.clone(),
        ChangeEvent::TaskChange(_) => None,
    });
    assert_eq!(with_id.as_deref(), Some(memory.id.as_str()));
}

#[tokio::test]
async fn rapid_external_writes_coalesce_into_one_change() {
    let (temp, service) = keyword_only_service().await;

    // Pre-create the file and let its add event settle.
    let project_dir = temp.path().join("memories").join("p1");
    std::fs::create_dir_all(&project_dir).unwrap();
    let file = project_dir.join("2025-06-01-external-note-000001.md");
    std::fs::write(&file, "---\nid: mem-ext1\n---\n\nversion 0\n").unwrap();

    let mut sub = service.subscribe();
    // Wait out the add event from the create above.
    let _ = drain(&mut sub, Duration::from_millis(500)).await;

    // Three rapid rewrites within the debounce window.
    for i in 1..=3 {
        std::fs::write(&file, format!("---\nid: mem-ext1\n---\n\nversion {i}\n")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let events = drain(&mut sub, Duration::from_millis(800)).await;
    let changes: Vec<_> = events
        .iter()
        .filter(|e| {
            matches!(&e.event, ChangeEvent::MemoryChange(data)
                if data.action == ChangeAction::Change && data.file.ends_with("external-note-000001.md"))
        })
        .collect();
    assert_eq!(
        changes.len(),
        1,
        "expected exactly one coalesced change event: {events:?}"
    );
}

#[tokio::test]
async fn external_delete_surfaces_as_unlink() {
    let (temp, service) = keyword_only_service().await;

    let memory = service
        .add_memory(NewMemory {
            content: "doomed by an external actor".to_string(),
            project: Some("p1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let relative = service
        .store()
        .memory_relative_path(&memory.id)
        .await
        .unwrap();

    let mut sub = service.subscribe();
    let _ = drain(&mut sub, Duration::from_millis(500)).await;

    std::fs::remove_file(temp.path().join("memories").join(&relative)).unwrap();

    let events = drain(&mut sub, Duration::from_millis(800)).await;
    assert!(
        events.iter().any(|e| {
            matches!(&e.event, ChangeEvent::MemoryChange(data)
                if data.action == ChangeAction::Unlink && data.file == relative)
        }),
        "no unlink event: {events:?}"
    );
}

#[tokio::test]
async fn task_files_produce_task_events() {
    let (_temp, service) = keyword_only_service().await;
    let mut sub = service.subscribe();

    service
        .create_task(recall::domain::NewTask {
            title: "Watched task".to_string(),
            project: Some("p1".to_string()),
            auto_link: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();

    let events = drain(&mut sub, Duration::from_millis(800)).await;
    assert!(
        events.iter().any(|e| {
            matches!(&e.event, ChangeEvent::TaskChange(data)
                if data.action == ChangeAction::Add && data.file.starts_with("p1/TASK-00001"))
        }),
        "no task add event: {events:?}"
    );
}

#[tokio::test]
async fn temp_files_never_surface() {
    let (temp, service) = keyword_only_service().await;
    let project_dir = temp.path().join("memories").join("p1");
    std::fs::create_dir_all(&project_dir).unwrap();

    let mut sub = service.subscribe();
    std::fs::write(project_dir.join("partial.md.tmp"), "half written").unwrap();

    let events = drain(&mut sub, Duration::from_millis(600)).await;
    assert!(
        events.is_empty(),
        "temp files must not produce events: {events:?}"
    );
}
