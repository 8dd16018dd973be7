//! Memory store integration tests: CRUD, layout, derivations, search
//! and corrupt-file quarantine.

mod common;

use common::keyword_only_service;
use recall::domain::{
    ContentType, MemoryCategory, MemoryFilter, MemoryId, MemoryPriority, MemoryUpdate, NewMemory,
};
use recall::paths::Roots;
use recall::settings::Settings;
use recall::Service;

fn note(content: &str, project: &str) -> NewMemory {
    NewMemory {
        content: content.to_string(),
        project: Some(project.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn created_memory_lands_in_project_directory_with_canonical_name() {
    let (temp, service) = keyword_only_service().await;

    let memory = service
        .add_memory(NewMemory {
            content: "API retry logic: exponential backoff with jitter".to_string(),
            tags: vec!["api".to_string(), "retry".to_string()],
            category: Some(MemoryCategory::Code),
            project: Some("Payments Team".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(memory.id.as_str().starts_with("mem-"));
    assert_eq!(memory.serial, "MEM-000001");
    assert_eq!(memory.project, "payments-team");

    let relative = service
        .store()
        .memory_relative_path(&memory.id)
        .await
        .unwrap();
    let date = memory.timestamp.format("%Y-%m-%d").to_string();
    assert!(
        relative.starts_with(&format!("payments-team/{date}-api-retry-logic-exponential")),
        "unexpected layout: {relative}"
    );
    assert!(relative.ends_with(".md"));

    let on_disk = temp
        .path()
        .join("memories")
        .join(&relative);
    assert!(on_disk.is_file());
    let text = std::fs::read_to_string(on_disk).unwrap();
    assert!(text.starts_with("---\n"));
    assert!(text.contains("category: code"));
}

#[tokio::test]
async fn complexity_and_content_type_are_derived() {
    let (_temp, service) = keyword_only_service().await;

    let plain = service.add_memory(note("call the dentist", "default")).await.unwrap();
    assert_eq!(plain.complexity, 1);
    assert_eq!(plain.metadata.content_type, ContentType::Text);

    let code = service
        .add_memory(NewMemory {
            content: "```rust\nfn main() {}\n```".to_string(),
            category: Some(MemoryCategory::Code),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(code.metadata.content_type, ContentType::Code);
    assert!(code.complexity >= 2);

    let heavy = service
        .add_memory(note(&"x".repeat(1500), "default"))
        .await
        .unwrap();
    assert_eq!(heavy.complexity, 4);
}

#[tokio::test]
async fn get_bumps_access_counters_once_per_fetch() {
    let (_temp, service) = keyword_only_service().await;
    let created = service.add_memory(note("count my reads", "p1")).await.unwrap();
    assert_eq!(created.access_count, 0);

    let first = service.get_memory(&created.id).await.unwrap();
    assert_eq!(first.access_count, 1);
    assert!(first.last_accessed.is_some());

    let second = service.get_memory(&created.id).await.unwrap();
    assert_eq!(second.access_count, 2);
}

#[tokio::test]
async fn serials_stay_monotonic_and_survive_reopen() {
    let (temp, service) = keyword_only_service().await;

    for i in 0..3 {
        service
            .add_memory(note(&format!("memory number {i}"), "p1"))
            .await
            .unwrap();
    }
    service.flush().await.unwrap();
    drop(service);

    // A cold start rescans the files and recovers the serial counter.
    let roots = Roots::from_dirs(
        temp.path().join("memories"),
        temp.path().join("tasks"),
        temp.path().join("data"),
    )
    .unwrap();
    let mut settings = Settings::default();
    settings.features.auto_backup = false;
    settings.features.enable_semantic_search = false;
    let reopened = Service::open(roots, settings).await.unwrap();

    let fourth = reopened.add_memory(note("after reopen", "p1")).await.unwrap();
    assert_eq!(fourth.serial, "MEM-000004");
}

#[tokio::test]
async fn list_is_most_recent_first_and_respects_filters() {
    let (_temp, service) = keyword_only_service().await;

    service.add_memory(note("first note", "p1")).await.unwrap();
    let second = service.add_memory(note("second note", "p1")).await.unwrap();
    service.add_memory(note("other project", "p2")).await.unwrap();

    let all_p1 = service
        .list_memories(&MemoryFilter {
            project: Some("p1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all_p1.len(), 2);
    // Same-second timestamps fall back to id order; both notes are
    // present and p2 is excluded.
    assert!(all_p1.iter().any(|m| m.id == second.id));
    assert!(all_p1.iter().all(|m| m.project == "p1"));

    let limited = service
        .list_memories(&MemoryFilter {
            project: Some("p1".to_string()),
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn search_matches_body_tags_and_title() {
    let (_temp, service) = keyword_only_service().await;

    service
        .add_memory(NewMemory {
            content: "Postgres connection pooling settings".to_string(),
            tags: vec!["database".to_string()],
            title: Some("Pooling".to_string()),
            project: Some("p1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    service
        .add_memory(note("Grocery list: milk and eggs", "p1"))
        .await
        .unwrap();

    let by_body = service
        .search_memories("connection pooling", &MemoryFilter::default())
        .await
        .unwrap();
    assert_eq!(by_body.len(), 1);

    let by_tag = service
        .search_memories("database", &MemoryFilter::default())
        .await
        .unwrap();
    assert_eq!(by_tag.len(), 1);

    let miss = service
        .search_memories("kubernetes", &MemoryFilter::default())
        .await
        .unwrap();
    assert!(miss.is_empty());
}

#[tokio::test]
async fn update_merges_and_preserves_immutables() {
    let (_temp, service) = keyword_only_service().await;
    let created = service.add_memory(note("original body", "p1")).await.unwrap();

    let updated = service
        .update_memory(
            &created.id,
            MemoryUpdate {
                content: Some("```python\nimport os\n```".to_string()),
                priority: Some(MemoryPriority::High),
                title: Some(Some("Scripted".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.timestamp, created.timestamp);
    assert_eq!(updated.priority, MemoryPriority::High);
    assert_eq!(updated.metadata.content_type, ContentType::Code);
    assert_eq!(updated.title.as_deref(), Some("Scripted"));

    // Clearing via the double-Option.
    let cleared = service
        .update_memory(
            &created.id,
            MemoryUpdate {
                title: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.title.is_none());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (_temp, service) = keyword_only_service().await;
    let created = service.add_memory(note("short lived", "p1")).await.unwrap();

    assert!(service.delete_memory(&created.id).await.unwrap());
    assert!(!service.delete_memory(&created.id).await.unwrap());
    assert!(service.get_memory(&created.id).await.is_err());

    let ghost = MemoryId::new("mem-zzzz");
    assert!(!service.delete_memory(&ghost).await.unwrap());
}

#[tokio::test]
async fn corrupt_files_are_quarantined_not_fatal() {
    let (temp, service) = keyword_only_service().await;
    service.add_memory(note("healthy", "p1")).await.unwrap();
    service.flush().await.unwrap();

    // A file with a header but no id is corrupt.
    std::fs::write(
        temp.path().join("memories").join("p1").join("broken.md"),
        "---\nstatus: active\n---\n\norphan body\n",
    )
    .unwrap();

    service.store().rescan().await.unwrap();

    let listed = service.list_memories(&MemoryFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);

    let health = service.health_check().await.unwrap();
    assert_eq!(health.corrupt_files, 1);
    assert!(!health.is_healthy());
    assert!(health
        .issues
        .iter()
        .any(|i| i.kind == "corrupt_file" && i.detail.contains("broken.md")));
}

#[tokio::test]
async fn atomic_writes_leave_no_partial_targets() {
    let (temp, service) = keyword_only_service().await;
    let created = service.add_memory(note("atomic", "p1")).await.unwrap();
    service.flush().await.unwrap();

    // No stray temp files after a settled write.
    let project_dir = temp.path().join("memories").join("p1");
    let strays: Vec<_> = std::fs::read_dir(&project_dir)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(strays.is_empty(), "stray temp files: {strays:?}");

    let reloaded = service.get_memory(&created.id).await.unwrap();
    assert_eq!(reloaded.body, "atomic");
}
