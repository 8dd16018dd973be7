//! Task store integration tests: hierarchy consistency, status
//! transitions, cascade deletes and serial monotonicity.

mod common;

use common::keyword_only_service;
use recall::domain::{NewTask, TaskFilter, TaskId, TaskStatus, TaskUpdate};
use recall::Error;

fn task(title: &str, project: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        project: Some(project.to_string()),
        auto_link: Some(false),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_assigns_monotonic_serials() {
    let (_temp, service) = keyword_only_service().await;

    let first = service.create_task(task("First", "p1")).await.unwrap();
    let second = service.create_task(task("Second", "p1")).await.unwrap();
    let third = service.create_task(task("Third", "p2")).await.unwrap();

    assert_eq!(first.serial, "TASK-00001");
    assert_eq!(second.serial, "TASK-00002");
    assert_eq!(third.serial, "TASK-00003");
    assert_eq!(first.status, TaskStatus::Todo);
}

#[tokio::test]
async fn subtask_wiring_is_bidirectional() {
    let (_temp, service) = keyword_only_service().await;

    let parent = service.create_task(task("Parent", "p1")).await.unwrap();
    let child = service
        .create_task(NewTask {
            parent_task: Some(parent.id.clone()),
            ..task("Child", "p1")
        })
        .await
        .unwrap();

    assert_eq!(child.parent_task.as_ref(), Some(&parent.id));
    let parent = service.get_task(parent.id.as_str()).await.unwrap();
    assert!(parent.subtasks.contains(&child.id));
}

#[tokio::test]
async fn creating_under_a_missing_parent_fails() {
    let (_temp, service) = keyword_only_service().await;
    let result = service
        .create_task(NewTask {
            parent_task: Some(TaskId::new("task-none")),
            ..task("Orphan", "p1")
        })
        .await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn status_transition_sequence_from_the_workflow_table() {
    let (_temp, service) = keyword_only_service().await;
    let created = service.create_task(task("Lifecycle", "p1")).await.unwrap();
    let id = created.id.clone();

    let step = |status: TaskStatus| TaskUpdate {
        status: Some(status),
        ..Default::default()
    };

    for (to, expect_ok) in [
        (TaskStatus::InProgress, true),
        (TaskStatus::Todo, true),
        (TaskStatus::Done, true),
        (TaskStatus::Todo, true),
        (TaskStatus::Blocked, true),
        (TaskStatus::Done, false),
        (TaskStatus::InProgress, true),
        (TaskStatus::Done, true),
    ] {
        let result = service.update_task(&id, step(to)).await;
        if expect_ok {
            assert_eq!(result.unwrap().status, to);
        } else {
            assert!(
                matches!(result, Err(Error::Conflict { .. })),
                "expected conflict moving to {to}"
            );
            // Conflict leaves state unchanged.
            assert_eq!(
                service.get_task(id.as_str()).await.unwrap().status,
                TaskStatus::Blocked
            );
        }
    }
}

#[tokio::test]
async fn completion_stamp_is_one_shot() {
    let (_temp, service) = keyword_only_service().await;
    let created = service.create_task(task("Complete me", "p1")).await.unwrap();
    let id = created.id.clone();

    let done = service
        .update_task(
            &id,
            TaskUpdate {
                status: Some(TaskStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let first_stamp = done.completed.expect("stamped on first done");

    // Reopen, then complete again: the stamp does not change.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    service
        .update_task(
            &id,
            TaskUpdate {
                status: Some(TaskStatus::Todo),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let redone = service
        .update_task(
            &id,
            TaskUpdate {
                status: Some(TaskStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(redone.completed, Some(first_stamp));
}

#[tokio::test]
async fn reparenting_rejects_cycles() {
    let (_temp, service) = keyword_only_service().await;

    let a = service.create_task(task("A", "p1")).await.unwrap();
    let b = service
        .create_task(NewTask {
            parent_task: Some(a.id.clone()),
            ..task("B", "p1")
        })
        .await
        .unwrap();
    let c = service
        .create_task(NewTask {
            parent_task: Some(b.id.clone()),
            ..task("C", "p1")
        })
        .await
        .unwrap();

    // a -> c would close the loop a <- b <- c.
    let result = service
        .update_task(
            &a.id,
            TaskUpdate {
                parent_task: Some(Some(c.id.clone())),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::InvalidInput { .. })));

    // Detaching and re-attaching elsewhere is fine.
    let detached = service
        .update_task(
            &b.id,
            TaskUpdate {
                parent_task: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(detached.parent_task.is_none());
    let a = service.get_task(a.id.as_str()).await.unwrap();
    assert!(!a.subtasks.contains(&b.id));
}

#[tokio::test]
async fn delete_cascades_to_parent_subtasks_and_memories() {
    let (_temp, service) = keyword_only_service().await;

    let memory = service
        .add_memory(recall::domain::NewMemory {
            content: "design notes for the big feature".to_string(),
            project: Some("p1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let parent = service.create_task(task("Big feature", "p1")).await.unwrap();
    let doomed = service
        .create_task(NewTask {
            parent_task: Some(parent.id.clone()),
            manual_memories: vec![memory.id.clone()],
            ..task("Doomed", "p1")
        })
        .await
        .unwrap();
    let sub_a = service
        .create_task(NewTask {
            parent_task: Some(doomed.id.clone()),
            ..task("Sub A", "p1")
        })
        .await
        .unwrap();
    let sub_b = service
        .create_task(NewTask {
            parent_task: Some(doomed.id.clone()),
            ..task("Sub B", "p1")
        })
        .await
        .unwrap();

    // The manual memory is mirrored before the delete.
    let linked = service.get_memory(&memory.id).await.unwrap();
    assert!(linked.task_connections.iter().any(|c| c.task_id == doomed.id));

    assert!(service.delete_task(&doomed.id).await.unwrap());

    assert!(service.get_task(doomed.id.as_str()).await.is_err());
    let parent = service.get_task(parent.id.as_str()).await.unwrap();
    assert!(!parent.subtasks.contains(&doomed.id));
    assert!(service
        .get_task(sub_a.id.as_str())
        .await
        .unwrap()
        .parent_task
        .is_none());
    assert!(service
        .get_task(sub_b.id.as_str())
        .await
        .unwrap()
        .parent_task
        .is_none());
    let memory = service.get_memory(&memory.id).await.unwrap();
    assert!(memory.task_connections.is_empty());

    // Idempotent.
    assert!(!service.delete_task(&doomed.id).await.unwrap());
}

#[tokio::test]
async fn list_filters_by_project_and_status() {
    let (_temp, service) = keyword_only_service().await;

    let a = service.create_task(task("One", "p1")).await.unwrap();
    service.create_task(task("Two", "p1")).await.unwrap();
    service.create_task(task("Three", "p2")).await.unwrap();
    service
        .update_task(
            &a.id,
            TaskUpdate {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let p1 = service
        .list_tasks(&TaskFilter {
            project: Some("p1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(p1.len(), 2);

    let in_progress = service
        .list_tasks(&TaskFilter {
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].id, a.id);
}

#[tokio::test]
async fn project_move_relocates_the_file() {
    let (temp, service) = keyword_only_service().await;
    let created = service.create_task(task("Mover", "p1")).await.unwrap();

    let moved = service
        .update_task(
            &created.id,
            TaskUpdate {
                project: Some("p2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    service.flush().await.unwrap();

    assert_eq!(moved.project, "p2");
    let old_dir = temp.path().join("tasks").join("p1");
    let new_dir = temp.path().join("tasks").join("p2");
    let count = |dir: &std::path::Path| {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    };
    assert_eq!(count(&old_dir), 0);
    assert_eq!(count(&new_dir), 1);
}

#[tokio::test]
async fn tasks_survive_a_reopen_with_hierarchy_intact() {
    let (temp, service) = keyword_only_service().await;
    let parent = service.create_task(task("Parent", "p1")).await.unwrap();
    let child = service
        .create_task(NewTask {
            parent_task: Some(parent.id.clone()),
            ..task("Child", "p1")
        })
        .await
        .unwrap();
    service.flush().await.unwrap();
    drop(service);

    let roots = recall::paths::Roots::from_dirs(
        temp.path().join("memories"),
        temp.path().join("tasks"),
        temp.path().join("data"),
    )
    .unwrap();
    let mut settings = recall::settings::Settings::default();
    settings.features.auto_backup = false;
    settings.features.enable_semantic_search = false;
    let reopened = recall::Service::open(roots, settings).await.unwrap();

    let parent = reopened.get_task(parent.id.as_str()).await.unwrap();
    assert!(parent.subtasks.contains(&child.id));
    let next = reopened.create_task(task("Next", "p1")).await.unwrap();
    assert_eq!(next.serial, "TASK-00003");
}
