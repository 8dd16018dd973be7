//! Crash-safe file writes via the temp-file-then-rename pattern.
//!
//! On POSIX systems a rename within one filesystem is atomic. Every
//! document mutation in recall funnels through [`write_atomic`]:
//!
//! 1. the full contents are written to `<file>.tmp`
//! 2. the temp file is fsynced and closed
//! 3. the temp file is renamed over the target
//!
//! A crash during step 1 or 2 leaves the original file intact and at
//! most a stray `.tmp` file behind. The rename in step 3 is the commit
//! point.
//!
//! Parsing and rendering in this crate never fail; the only fallible
//! operations are these file writes, which surface plain
//! [`std::io::Error`]s.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Atomically write `contents` to `path`.
///
/// # Errors
///
/// Returns an error if the temp file cannot be created or written, the
/// fsync fails, or the rename fails (e.g. cross-filesystem target). On
/// failure the temp file is removed best-effort and the original file,
/// if any, is unchanged.
pub async fn write_atomic(path: impl AsRef<Path>, contents: &str) -> io::Result<()> {
    let path = path.as_ref();
    let temp_path = temp_path_for(path);

    let write_result = write_and_sync(&temp_path, contents).await;
    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    tokio::fs::rename(&temp_path, path).await?;
    tracing::trace!(path = %path.display(), bytes = contents.len(), "atomic write committed");
    Ok(())
}

/// The temp path used for atomic writes to `path`: `<file>.<ext>.tmp`,
/// or `<file>.tmp` when there is no extension.
#[must_use]
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => std::ffi::OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}

async fn write_and_sync(temp_path: &Path, contents: &str) -> io::Result<()> {
    let mut file = File::create(temp_path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}
