//! Shared test fixtures.

use recall::paths::Roots;
use recall::settings::Settings;
use recall::Service;
use tempfile::TempDir;

/// A service over fresh temp roots, keyword-only and without the
/// periodic backup loop (snapshots still work on demand).
pub async fn keyword_only_service() -> (TempDir, Service) {
    let temp = TempDir::new().expect("create temp dir");
    let roots = Roots::from_dirs(
        temp.path().join("memories"),
        temp.path().join("tasks"),
        temp.path().join("data"),
    )
    .expect("create roots");

    let mut settings = Settings::default();
    settings.features.auto_backup = false;
    settings.features.enable_semantic_search = false;

    let service = Service::open(roots, settings).await.expect("open service");
    (temp, service)
}

/// A service with the built-in vector index enabled.
#[allow(dead_code)]
pub async fn semantic_service() -> (TempDir, Service) {
    let temp = TempDir::new().expect("create temp dir");
    let roots = Roots::from_dirs(
        temp.path().join("memories"),
        temp.path().join("tasks"),
        temp.path().join("data"),
    )
    .expect("create roots");

    let mut settings = Settings::default();
    settings.features.auto_backup = false;

    let service = Service::open(roots, settings).await.expect("open service");
    (temp, service)
}
