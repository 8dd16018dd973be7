//! Backup snapshots, rotation and recovery.
//!
//! Snapshots copy the memory/task/data trees into
//! `<dataRoot>/backups/<iso-ts>-<reason>/` with a JSON manifest.
//! Rotation keeps the N most recent by the timestamp parsed from the
//! directory name. Recovery verifies the manifest, snapshots the
//! current state under `pre-recovery`, then swaps the sub-trees back
//! into place.

use crate::domain::{parse_rfc3339, rfc3339};
use crate::error::{Error, Result};
use crate::paths::Roots;
use crate::settings::Settings;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

const MANIFEST_FILE: &str = "backup-manifest.json";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// Snapshot manifest, written alongside the copied trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    /// When the snapshot was taken (RFC 3339).
    pub timestamp: String,

    /// Why it was taken (`periodic`, `pre-delete`, `pre-recovery`, …).
    pub reason: String,

    /// Crate version that wrote the snapshot.
    pub version: String,

    /// The roots the snapshot was taken from.
    pub paths: ManifestPaths,

    /// Relative file lists per tree.
    pub contents: ManifestContents,

    /// Aggregate counts and sizes.
    pub statistics: ManifestStatistics,

    /// The settings in effect at snapshot time.
    pub settings: Settings,
}

/// Source roots recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPaths {
    /// Memories root.
    pub memories: String,
    /// Tasks root.
    pub tasks: String,
    /// Data root.
    pub data: String,
}

/// Relative file lists per copied tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestContents {
    /// Files under `memories/`.
    pub memories: Vec<String>,
    /// Files under `tasks/`.
    pub tasks: Vec<String>,
    /// Files under `data/`.
    pub data: Vec<String>,
}

/// Aggregate snapshot statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStatistics {
    /// Number of task files.
    pub tasks: usize,
    /// Number of memory files.
    pub memories: usize,
    /// Number of data files.
    pub data_files: usize,
    /// Total copied bytes.
    pub total_size: u64,
}

/// A discovered snapshot.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    /// Snapshot directory.
    pub path: PathBuf,
    /// Parsed timestamp from the directory name.
    pub timestamp: DateTime<Utc>,
    /// Reason suffix from the directory name.
    pub reason: String,
}

/// Backup configuration and operations over one set of roots.
pub struct BackupManager {
    roots: Roots,
    settings: Settings,
}

impl BackupManager {
    /// Create a manager for the given roots and settings.
    #[must_use]
    pub fn new(roots: Roots, settings: Settings) -> Self {
        Self { roots, settings }
    }

    /// Take a snapshot now, then rotate.
    ///
    /// # Errors
    ///
    /// Returns an error when the copy or manifest write fails.
    pub async fn snapshot(&self, reason: &str) -> Result<PathBuf> {
        let now = Utc::now();
        let dir_name = format!("{}Z-{}", now.format(TIMESTAMP_FORMAT), sanitize_reason(reason));
        let backup_dir = self.roots.backups().join(dir_name);
        tokio::fs::create_dir_all(&backup_dir).await?;

        let memories = copy_tree(&self.roots.memories, &backup_dir.join("memories"), &[]).await?;
        let tasks = copy_tree(&self.roots.tasks, &backup_dir.join("tasks"), &[]).await?;
        // The data tree must not recurse into the backups themselves.
        let data = copy_tree(
            &self.roots.data,
            &backup_dir.join("data"),
            &["backups"],
        )
        .await?;

        let total_size = memories.bytes + tasks.bytes + data.bytes;
        let manifest = BackupManifest {
            timestamp: rfc3339(now),
            reason: reason.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            paths: ManifestPaths {
                memories: self.roots.memories.display().to_string(),
                tasks: self.roots.tasks.display().to_string(),
                data: self.roots.data.display().to_string(),
            },
            statistics: ManifestStatistics {
                tasks: tasks.files.len(),
                memories: memories.files.len(),
                data_files: data.files.len(),
                total_size,
            },
            contents: ManifestContents {
                memories: memories.files,
                tasks: tasks.files,
                data: data.files,
            },
            settings: self.settings.clone(),
        };
        let raw = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(backup_dir.join(MANIFEST_FILE), raw).await?;

        self.rotate().await?;
        tracing::info!(dir = %backup_dir.display(), reason, "backup snapshot written");
        Ok(backup_dir)
    }

    /// Delete the oldest snapshots beyond the rotation count.
    /// `pre-recovery` snapshots are exempt; they document recoveries.
    ///
    /// # Errors
    ///
    /// Returns an error when a snapshot directory cannot be removed.
    pub async fn rotate(&self) -> Result<()> {
        let mut backups: Vec<BackupInfo> = self
            .list_backups()
            .await?
            .into_iter()
            .filter(|b| b.reason != "pre-recovery")
            .collect();
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        for stale in backups.iter().skip(self.settings.features.max_backups.max(1)) {
            tracing::info!(dir = %stale.path.display(), "rotating out old backup");
            tokio::fs::remove_dir_all(&stale.path).await?;
        }
        Ok(())
    }

    /// Discover snapshots under the backups directory, unsorted.
    ///
    /// # Errors
    ///
    /// Returns an error when the backups directory cannot be read.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let backups_dir = self.roots.backups();
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&backups_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((timestamp, reason)) = parse_backup_dir_name(&name) {
                found.push(BackupInfo {
                    path: entry.path(),
                    timestamp,
                    reason,
                });
            }
        }
        Ok(found)
    }

    /// The most recent snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the backups directory cannot be read.
    pub async fn latest_backup(&self) -> Result<Option<BackupInfo>> {
        Ok(self
            .list_backups()
            .await?
            .into_iter()
            .max_by_key(|b| b.timestamp))
    }

    /// Whether periodic backups are overdue (no snapshot within twice
    /// the configured interval).
    ///
    /// # Errors
    ///
    /// Returns an error when the backups directory cannot be read.
    pub async fn is_overdue(&self) -> Result<bool> {
        if !self.settings.features.auto_backup {
            return Ok(false);
        }
        let Some(latest) = self.latest_backup().await? else {
            return Ok(true);
        };
        let age = Utc::now() - latest.timestamp;
        let threshold = chrono::Duration::from_std(self.settings.backup_interval() * 2)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        Ok(age > threshold)
    }

    /// Restore the memory and task trees from a snapshot.
    ///
    /// The manifest is verified first; the current state is snapshotted
    /// under `pre-recovery` before anything moves. Each tree is moved
    /// aside, the backup copy moved into place, and the aside copy
    /// removed only after the restore succeeded.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the directory is not a verifiable snapshot;
    /// IO errors (with the aside copy restored) when the swap fails.
    pub async fn recover(&self, backup_dir: &Path) -> Result<BackupManifest> {
        let manifest_path = backup_dir.join(MANIFEST_FILE);
        let raw = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|_| Error::invalid("backup", format!(
                "no readable manifest at {}",
                manifest_path.display()
            )))?;
        let manifest: BackupManifest = serde_json::from_str(&raw)
            .map_err(|e| Error::invalid("backup", format!("malformed manifest: {e}")))?;

        self.snapshot("pre-recovery").await?;

        // Aside copies live under the data root so nothing is ever
        // written outside the sandbox.
        restore_tree(
            &backup_dir.join("memories"),
            &self.roots.memories,
            &self.roots.data.join(".recovering-memories"),
        )
        .await?;
        restore_tree(
            &backup_dir.join("tasks"),
            &self.roots.tasks,
            &self.roots.data.join(".recovering-tasks"),
        )
        .await?;
        restore_data_files(&backup_dir.join("data"), &self.roots.data).await?;

        tracing::info!(dir = %backup_dir.display(), "recovery complete");
        Ok(manifest)
    }

    /// Best-effort snapshot taken when an unexpected internal error is
    /// about to surface.
    pub async fn emergency(&self, context: &str) {
        let reason = format!("emergency-{}", sanitize_reason(context));
        if let Err(e) = self.snapshot(&reason).await {
            tracing::error!(error = %e, "emergency backup failed");
        }
    }

    /// Spawn the periodic snapshot loop, if enabled by settings.
    #[must_use]
    pub fn spawn_periodic(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.settings.features.auto_backup {
            return None;
        }
        let manager = Arc::clone(self);
        let interval = self.settings.backup_interval();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so opening a
            // store does not always write a snapshot.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.snapshot("periodic").await {
                    tracing::error!(error = %e, "periodic backup failed");
                }
            }
        }))
    }
}

fn sanitize_reason(reason: &str) -> String {
    let cleaned: String = reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "backup".to_string()
    } else {
        trimmed.chars().take(40).collect()
    }
}

fn parse_backup_dir_name(name: &str) -> Option<(DateTime<Utc>, String)> {
    let (timestamp_part, reason) = name.split_once("Z-")?;
    let naive = NaiveDateTime::parse_from_str(timestamp_part, TIMESTAMP_FORMAT).ok()?;
    Some((naive.and_utc(), reason.to_string()))
}

struct CopyStats {
    files: Vec<String>,
    bytes: u64,
}

/// Recursively copy `src` into `dst`, skipping top-level directories
/// named in `skip`. Returns relative paths and byte counts.
async fn copy_tree(src: &Path, dst: &Path, skip: &[&str]) -> Result<CopyStats> {
    let mut stats = CopyStats {
        files: Vec::new(),
        bytes: 0,
    };
    if !src.exists() {
        return Ok(stats);
    }
    copy_tree_inner(src, dst, src, skip, true, &mut stats).await?;
    stats.files.sort();
    Ok(stats)
}

fn copy_tree_inner<'a>(
    src: &'a Path,
    dst: &'a Path,
    base: &'a Path,
    skip: &'a [&'a str],
    top_level: bool,
    stats: &'a mut CopyStats,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dst).await?;
        let mut entries = tokio::fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                if top_level && skip.iter().any(|s| name.to_string_lossy() == *s) {
                    continue;
                }
                copy_tree_inner(&path, &dst.join(&name), base, skip, false, stats).await?;
            } else if file_type.is_file() {
                // Stray .tmp files from interrupted writes are not data.
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    continue;
                }
                let metadata = entry.metadata().await?;
                tokio::fs::copy(&path, dst.join(&name)).await?;
                stats.bytes += metadata.len();
                if let Ok(relative) = path.strip_prefix(base) {
                    stats.files.push(relative.to_string_lossy().into_owned());
                }
            }
        }
        Ok(())
    })
}

/// Swap `target` for the tree stored at `src`: move the current target
/// aside, copy the backup in, then drop the aside copy. On copy failure
/// the aside copy is moved back.
async fn restore_tree(src: &Path, target: &Path, aside: &Path) -> Result<()> {
    if !src.exists() {
        return Ok(());
    }

    if aside.exists() {
        tokio::fs::remove_dir_all(aside).await?;
    }
    let had_current = target.exists();
    if had_current {
        tokio::fs::rename(target, aside).await?;
    }

    match copy_tree(src, target, &[]).await {
        Ok(_) => {
            if had_current {
                tokio::fs::remove_dir_all(aside).await?;
            }
            Ok(())
        }
        Err(e) => {
            if had_current {
                let _ = tokio::fs::remove_dir_all(target).await;
                let _ = tokio::fs::rename(aside, target).await;
            }
            Err(e)
        }
    }
}

/// Restore top-level data files (settings and path settings) without
/// touching backups or vectors.
async fn restore_data_files(src: &Path, target: &Path) -> Result<()> {
    for file in ["settings.json", "path-settings.json"] {
        let from = src.join(file);
        if from.exists() {
            tokio::fs::copy(&from, target.join(file)).await?;
        }
    }
    Ok(())
}

/// Parse the manifest timestamp back out (used by health reporting).
#[must_use]
pub fn manifest_timestamp(manifest: &BackupManifest) -> Option<DateTime<Utc>> {
    parse_rfc3339(&manifest.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_name_round_trips() {
        let now = Utc::now();
        let name = format!("{}Z-{}", now.format(TIMESTAMP_FORMAT), "pre-delete");
        let (parsed, reason) = parse_backup_dir_name(&name).unwrap();
        assert_eq!(reason, "pre-delete");
        assert!((now - parsed).num_milliseconds().abs() < 5);
    }

    #[test]
    fn unparseable_dir_names_are_ignored() {
        assert!(parse_backup_dir_name("not-a-backup").is_none());
        assert!(parse_backup_dir_name("2025-06-01-missing-time").is_none());
    }

    #[test]
    fn reasons_are_sanitized_for_dir_names() {
        assert_eq!(sanitize_reason("pre-delete"), "pre-delete");
        assert_eq!(sanitize_reason("weird/../reason!"), "weird----reason");
        assert_eq!(sanitize_reason("///"), "backup");
    }
}
