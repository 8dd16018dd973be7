//! Backup subsystem integration tests: snapshots, manifests, rotation
//! and recovery.

mod common;

use common::keyword_only_service;
use recall::backup::{BackupManager, BackupManifest};
use recall::domain::{MemoryFilter, NewMemory};
use recall::paths::Roots;
use recall::settings::Settings;

fn note(content: &str) -> NewMemory {
    NewMemory {
        content: content.to_string(),
        project: Some("p1".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn snapshot_copies_trees_and_writes_manifest() {
    let (temp, service) = keyword_only_service().await;
    service.add_memory(note("snapshot me")).await.unwrap();
    service
        .create_task(recall::domain::NewTask {
            title: "Snapshot task".to_string(),
            project: Some("p1".to_string()),
            auto_link: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    service.flush().await.unwrap();

    let dir = service.backup().snapshot("test").await.unwrap();
    assert!(dir.starts_with(temp.path().join("data").join("backups")));

    let manifest: BackupManifest = serde_json::from_str(
        &std::fs::read_to_string(dir.join("backup-manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.reason, "test");
    assert_eq!(manifest.statistics.memories, 1);
    assert_eq!(manifest.statistics.tasks, 1);
    assert!(manifest.statistics.total_size > 0);
    assert_eq!(manifest.contents.memories.len(), 1);
    assert!(manifest.contents.memories[0].starts_with("p1/"));

    // The copied tree exists and skips nothing but backups.
    assert!(dir.join("memories").join("p1").is_dir());
    assert!(dir.join("tasks").join("p1").is_dir());
    assert!(!dir.join("data").join("backups").exists());
}

#[tokio::test]
async fn rotation_keeps_only_the_most_recent() {
    let temp = tempfile::TempDir::new().unwrap();
    let roots = Roots::from_dirs(
        temp.path().join("memories"),
        temp.path().join("tasks"),
        temp.path().join("data"),
    )
    .unwrap();
    let mut settings = Settings::default();
    settings.features.max_backups = 3;
    let manager = BackupManager::new(roots, settings);

    for i in 0..6 {
        manager.snapshot(&format!("round-{i}")).await.unwrap();
        // Distinct millisecond timestamps keep the ordering strict.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let mut backups = manager.list_backups().await.unwrap();
    assert_eq!(backups.len(), 3);
    backups.sort_by_key(|b| b.timestamp);
    assert_eq!(backups[0].reason, "round-3");
    assert_eq!(backups[2].reason, "round-5");
}

#[tokio::test]
async fn delete_then_recover_restores_the_memory() {
    let (_temp, service) = keyword_only_service().await;

    let memory = service.add_memory(note("precious data")).await.unwrap();
    service.flush().await.unwrap();

    let snapshot = service.backup().snapshot("s1").await.unwrap();

    assert!(service.delete_memory(&memory.id).await.unwrap());
    assert!(service.get_memory(&memory.id).await.is_err());

    service.backup().recover(&snapshot).await.unwrap();
    service.store().rescan().await.unwrap();

    let restored = service.get_memory(&memory.id).await.unwrap();
    assert_eq!(restored.body, "precious data");

    // A pre-recovery snapshot documents the state before the swap.
    let backups = service.backup().list_backups().await.unwrap();
    assert!(backups.iter().any(|b| b.reason == "pre-recovery"));
}

#[tokio::test]
async fn recover_rejects_directories_without_a_manifest() {
    let (temp, service) = keyword_only_service().await;
    let bogus = temp.path().join("data").join("backups").join("not-a-backup");
    std::fs::create_dir_all(&bogus).unwrap();

    let result = service.backup().recover(&bogus).await;
    assert!(matches!(result, Err(recall::Error::InvalidInput { .. })));

    // Nothing was disturbed.
    let memories = service.list_memories(&MemoryFilter::default()).await.unwrap();
    assert!(memories.is_empty());
}

#[tokio::test]
async fn pre_delete_snapshots_are_taken_automatically() {
    let (_temp, service) = keyword_only_service().await;
    let memory = service.add_memory(note("goes away")).await.unwrap();
    service.delete_memory(&memory.id).await.unwrap();

    let backups = service.backup().list_backups().await.unwrap();
    assert!(
        backups.iter().any(|b| b.reason == "pre-delete-memory"),
        "missing pre-delete snapshot: {backups:?}"
    );
}

#[tokio::test]
async fn backup_freshness_reporting() {
    let temp = tempfile::TempDir::new().unwrap();
    let roots = Roots::from_dirs(
        temp.path().join("memories"),
        temp.path().join("tasks"),
        temp.path().join("data"),
    )
    .unwrap();
    let settings = Settings::default();
    let manager = BackupManager::new(roots, settings);

    // No snapshot yet: overdue.
    assert!(manager.is_overdue().await.unwrap());

    manager.snapshot("fresh").await.unwrap();
    assert!(!manager.is_overdue().await.unwrap());
}
