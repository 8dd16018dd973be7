//! Filesystem watcher feeding the change-event bus.
//!
//! A recursive `notify` watcher observes both roots. Raw events are
//! bridged onto tokio, debounced per path (100 ms) to coalesce
//! editor-style multi-event saves, translated to typed change events
//! (root kind, project, id when the index resolves the path) and
//! published on the bus.
//!
//! Internal store mutations are observed here too: the atomic rename
//! is the commit point, so events always fire after commit, for
//! internal and external writers alike.

use crate::events::{ChangeAction, ChangeData, ChangeEvent, EventBus};
use crate::paths::Roots;
use crate::store::index::StoreIndex;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// Per-path debounce window.
pub(crate) const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Keeps the watcher and its pump task alive.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start watching both roots and publishing debounced change events.
///
/// # Errors
///
/// Returns the underlying `notify` error when the platform watcher
/// cannot be created or a root cannot be registered.
pub(crate) fn spawn(
    roots: Roots,
    bus: EventBus,
    index: Arc<RwLock<StoreIndex>>,
) -> notify::Result<WatcherHandle> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        let _ = tx.send(result);
    })?;
    watcher.watch(&roots.memories, RecursiveMode::Recursive)?;
    watcher.watch(&roots.tasks, RecursiveMode::Recursive)?;

    let task = tokio::spawn(pump(roots, bus, index, rx));
    Ok(WatcherHandle {
        _watcher: watcher,
        task,
    })
}

struct PendingChange {
    action: ChangeAction,
    due: Instant,
}

async fn pump(
    roots: Roots,
    bus: EventBus,
    index: Arc<RwLock<StoreIndex>>,
    mut rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
) {
    let mut pending: HashMap<PathBuf, PendingChange> = HashMap::new();

    loop {
        let next_due = pending.values().map(|p| p.due).min();
        let event = match next_due {
            Some(due) => tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => Some(event),
                    None => break,
                },
                () = tokio::time::sleep_until(due) => None,
            },
            None => match rx.recv().await {
                Some(event) => Some(event),
                None => break,
            },
        };

        match event {
            Some(Ok(raw)) => {
                for (path, action) in classify(&raw) {
                    if !is_entity_file(&path) {
                        continue;
                    }
                    let merged = match pending.remove(&path) {
                        Some(previous) => merge_actions(previous.action, action),
                        None => action,
                    };
                    pending.insert(
                        path,
                        PendingChange {
                            action: merged,
                            due: Instant::now() + DEBOUNCE_WINDOW,
                        },
                    );
                }
            }
            Some(Err(e)) => tracing::warn!(error = %e, "filesystem watcher error"),
            None => {}
        }

        // Flush everything whose window elapsed.
        let now = Instant::now();
        let due_paths: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in due_paths {
            if let Some(change) = pending.remove(&path) {
                if let Some(event) = translate(&roots, &index, &path, change.action).await {
                    bus.publish(event);
                }
            }
        }
    }

    // Channel closed: drain what is left.
    for (path, change) in pending.drain() {
        if let Some(event) = translate(&roots, &index, &path, change.action).await {
            bus.publish(event);
        }
    }
}

/// Map a raw notify event onto per-path actions.
fn classify(event: &notify::Event) -> Vec<(PathBuf, ChangeAction)> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), ChangeAction::Add))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), ChangeAction::Unlink))
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::Both, [from, to]) => vec![
                (from.clone(), ChangeAction::Unlink),
                (to.clone(), ChangeAction::Add),
            ],
            (RenameMode::From, paths) => paths
                .iter()
                .map(|p| (p.clone(), ChangeAction::Unlink))
                .collect(),
            (_, paths) => paths
                .iter()
                .map(|p| (p.clone(), ChangeAction::Add))
                .collect(),
        },
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), ChangeAction::Change))
            .collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Coalesce two actions observed for one path within the window.
fn merge_actions(first: ChangeAction, second: ChangeAction) -> ChangeAction {
    use ChangeAction::{Add, Change, Unlink};
    match (first, second) {
        // A brand-new file being rewritten is still an add.
        (Add, Change) => Add,
        // Replaced in place (remove + add) reads as a change.
        (Unlink, Add | Change) => Change,
        (_, Unlink) => Unlink,
        (first, Change) => first,
        (_, second) => second,
    }
}

fn is_entity_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "md")
}

async fn translate(
    roots: &Roots,
    index: &Arc<RwLock<StoreIndex>>,
    path: &Path,
    action: ChangeAction,
) -> Option<ChangeEvent> {
    let (is_memory, relative) = if let Ok(relative) = path.strip_prefix(&roots.memories) {
        (true, relative)
    } else if let Ok(relative) = path.strip_prefix(&roots.tasks) {
        (false, relative)
    } else {
        return None;
    };

    let project = relative
        .components()
        .next()
        .filter(|_| relative.components().count() > 1)
        .map(|c| c.as_os_str().to_string_lossy().into_owned());

    let id = {
        let index = index.read().await;
        if is_memory {
            index
                .memories
                .iter()
                .find(|(_, slot)| slot.file == path)
                .map(|(id, _)| id.to_string())
        } else {
            index
                .tasks
                .iter()
                .find(|(_, slot)| slot.file == path)
                .map(|(id, _)| id.to_string())
        }
    };

    let data = ChangeData {
        action,
        file: relative.to_string_lossy().into_owned(),
        project,
        id,
    };
    Some(if is_memory {
        ChangeEvent::MemoryChange(data)
    } else {
        ChangeEvent::TaskChange(data)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::add_then_change(ChangeAction::Add, ChangeAction::Change, ChangeAction::Add)]
    #[case::add_then_unlink(ChangeAction::Add, ChangeAction::Unlink, ChangeAction::Unlink)]
    #[case::unlink_then_add(ChangeAction::Unlink, ChangeAction::Add, ChangeAction::Change)]
    #[case::change_then_change(ChangeAction::Change, ChangeAction::Change, ChangeAction::Change)]
    #[case::change_then_unlink(ChangeAction::Change, ChangeAction::Unlink, ChangeAction::Unlink)]
    fn action_merge_rules(
        #[case] first: ChangeAction,
        #[case] second: ChangeAction,
        #[case] expected: ChangeAction,
    ) {
        assert_eq!(merge_actions(first, second), expected);
    }

    #[test]
    fn only_markdown_files_are_entities() {
        assert!(is_entity_file(Path::new("/roots/memories/p1/note.md")));
        assert!(!is_entity_file(Path::new("/roots/memories/p1/note.md.tmp")));
        assert!(!is_entity_file(Path::new("/roots/memories/p1/.DS_Store")));
    }
}
