//! Path and root-directory resolution with sandbox validation.
//!
//! All downstream components receive already-validated absolute roots;
//! nothing outside them is ever read or written. Resolution precedence
//! for each root: environment variable, then `path-settings.json` in
//! the data root, then a cwd-relative default.

use crate::error::{PathError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Environment variable overriding the memories root.
pub const ENV_MEMORIES_DIR: &str = "RECALL_MEMORIES_DIR";
/// Environment variable overriding the tasks root.
pub const ENV_TASKS_DIR: &str = "RECALL_TASKS_DIR";
/// Environment variable overriding the data root.
pub const ENV_DATA_DIR: &str = "RECALL_DATA_DIR";

const MAX_PATH_BYTES: usize = 3900;
const MAX_PATH_DEPTH: usize = 32;
const MAX_PROJECT_LEN: usize = 64;

/// The validated absolute roots all components operate within.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roots {
    /// Where memory files live (`<memories>/<project>/<file>.md`).
    pub memories: PathBuf,

    /// Where task files live (`<tasks>/<project>/<file>.md`).
    pub tasks: PathBuf,

    /// Where settings, backups and vectors live.
    pub data: PathBuf,
}

/// Saved root overrides (`<dataRoot>/path-settings.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    /// Saved memories root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memories_dir: Option<String>,

    /// Saved tasks root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_dir: Option<String>,
}

impl Roots {
    /// Resolve roots from the environment, saved settings and defaults,
    /// validating every path and creating missing directories.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when a configured path fails validation or
    /// a root cannot be created.
    pub fn resolve(base: &Path) -> Result<Self> {
        let data = match std::env::var(ENV_DATA_DIR) {
            Ok(dir) if !dir.is_empty() => validate_root(base, Path::new(&dir))?,
            _ => base.join("data"),
        };

        // Saved overrides live in the data root, so it resolves first.
        let saved = load_path_settings(&data);

        let memories = resolve_one(
            base,
            ENV_MEMORIES_DIR,
            saved.memories_dir.as_deref(),
            "memories",
        )?;
        let tasks = resolve_one(base, ENV_TASKS_DIR, saved.tasks_dir.as_deref(), "tasks")?;

        let roots = Self {
            memories,
            tasks,
            data,
        };
        roots.create_missing()?;
        Ok(roots)
    }

    /// Build roots directly from explicit directories (used by tests
    /// and embedding callers). Paths are validated and created.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when a path fails validation or creation.
    pub fn from_dirs(
        memories: impl Into<PathBuf>,
        tasks: impl Into<PathBuf>,
        data: impl Into<PathBuf>,
    ) -> Result<Self> {
        let roots = Self {
            memories: memories.into(),
            tasks: tasks.into(),
            data: data.into(),
        };
        for root in [&roots.memories, &roots.tasks, &roots.data] {
            check_length_and_depth(root)?;
        }
        roots.create_missing()?;
        Ok(roots)
    }

    /// The backups directory under the data root.
    #[must_use]
    pub fn backups(&self) -> PathBuf {
        self.data.join("backups")
    }

    /// The vector persistence directory under the data root.
    #[must_use]
    pub fn vectors(&self) -> PathBuf {
        self.data.join("vectors")
    }

    /// The settings file under the data root.
    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.data.join("settings.json")
    }

    /// The project directory for memories, validating the label.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when the label fails component validation.
    pub fn memory_project_dir(&self, project: &str) -> Result<PathBuf> {
        validate_component(project)?;
        Ok(self.memories.join(project))
    }

    /// The project directory for tasks, validating the label.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when the label fails component validation.
    pub fn task_project_dir(&self, project: &str) -> Result<PathBuf> {
        validate_component(project)?;
        Ok(self.tasks.join(project))
    }

    /// Whether `path` lies inside one of the configured roots.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        [&self.memories, &self.tasks, &self.data]
            .iter()
            .any(|root| path.starts_with(root))
    }

    fn create_missing(&self) -> Result<()> {
        for root in [&self.memories, &self.tasks, &self.data] {
            if let Err(source) = std::fs::create_dir_all(root) {
                return Err(PathError::PermissionDenied {
                    path: root.display().to_string(),
                    source,
                }
                .into());
            }
        }
        Ok(())
    }
}

fn resolve_one(
    base: &Path,
    env_var: &str,
    saved: Option<&str>,
    default_name: &str,
) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(env_var) {
        if !dir.is_empty() {
            return validate_root(base, Path::new(&dir));
        }
    }
    if let Some(dir) = saved {
        return validate_root(base, Path::new(dir));
    }
    Ok(base.join(default_name))
}

fn load_path_settings(data: &Path) -> PathSettings {
    let file = data.join("path-settings.json");
    match std::fs::read_to_string(&file) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(file = %file.display(), error = %e, "ignoring malformed path-settings.json");
            PathSettings::default()
        }),
        Err(_) => PathSettings::default(),
    }
}

/// Validate a configured root path: each component must pass the
/// sandbox rules, and relative paths are anchored at `base`.
///
/// A `..` component is an attempt to resolve above the anchor and is
/// rejected as a sandbox escape.
fn validate_root(base: &Path, configured: &Path) -> Result<PathBuf> {
    for component in configured.components() {
        match component {
            Component::ParentDir => {
                return Err(PathError::OutsideSandbox {
                    path: configured.display().to_string(),
                    root: base.display().to_string(),
                }
                .into());
            }
            Component::Normal(os) => {
                let Some(text) = os.to_str() else {
                    return Err(PathError::InvalidComponent {
                        component: os.to_string_lossy().into_owned(),
                        reason: "component is not valid UTF-8",
                    }
                    .into());
                };
                validate_component(text)?;
            }
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }

    let absolute = if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        base.join(configured)
    };
    check_length_and_depth(&absolute)?;
    Ok(absolute)
}

fn check_length_and_depth(path: &Path) -> Result<()> {
    if path.as_os_str().len() > MAX_PATH_BYTES {
        return Err(PathError::TooLong {
            max: MAX_PATH_BYTES,
        }
        .into());
    }
    if path.components().count() > MAX_PATH_DEPTH {
        return Err(PathError::TooDeep {
            max: MAX_PATH_DEPTH,
        }
        .into());
    }
    Ok(())
}

/// Validate a single path component against the sandbox rules.
///
/// Rejects traversal (`..`), NUL bytes, any `%`-escape (URL-encoded
/// traversal), filesystem-illegal characters, control characters and
/// separators.
///
/// # Errors
///
/// Returns [`PathError::InvalidComponent`] naming the first violation.
pub fn validate_component(component: &str) -> Result<()> {
    let reject = |reason: &'static str| -> Result<()> {
        Err(PathError::InvalidComponent {
            component: component.to_string(),
            reason,
        }
        .into())
    };

    if component.is_empty() {
        return reject("component is empty");
    }
    if component == "." || component == ".." || component.contains("..") {
        return reject("parent-directory traversal is not allowed");
    }
    if component.contains('\0') {
        return reject("NUL bytes are not allowed");
    }
    if component.contains('%') {
        return reject("URL-encoded sequences are not allowed");
    }
    if component.contains('/') || component.contains('\\') {
        return reject("path separators are not allowed inside a component");
    }
    if component.chars().any(|c| c.is_control()) {
        return reject("control characters are not allowed");
    }
    if component.chars().any(|c| matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*')) {
        return reject("filesystem-illegal characters are not allowed");
    }
    if component.len() > 255 {
        return reject("component exceeds 255 bytes");
    }
    Ok(())
}

/// Sanitize a project label into a safe directory name.
///
/// Lowercases, maps anything outside `[a-z0-9_-]` to `-`, collapses
/// runs, trims leading/trailing separators and caps the length. Empty
/// input (or input that sanitizes to nothing) yields `default`.
#[must_use]
pub fn sanitize_project(label: Option<&str>) -> String {
    let Some(label) = label else {
        return crate::domain::DEFAULT_PROJECT.to_string();
    };

    let mut out = String::with_capacity(label.len().min(MAX_PROJECT_LEN));
    let mut last_dash = false;
    for c in label.trim().chars() {
        let mapped = match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '_') => c,
            _ => '-',
        };
        if mapped == '-' {
            if !last_dash && !out.is_empty() {
                out.push('-');
            }
            last_dash = true;
        } else {
            out.push(mapped);
            last_dash = false;
        }
        if out.len() >= MAX_PROJECT_LEN {
            break;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        crate::domain::DEFAULT_PROJECT.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::traversal("..")]
    #[case::embedded_traversal("a..b")]
    #[case::nul("a\0b")]
    #[case::url_encoded("%2e%2e")]
    #[case::url_encoded_any("proj%20name")]
    #[case::separator("a/b")]
    #[case::backslash("a\\b")]
    #[case::illegal_char("a:b")]
    #[case::wildcard("a*b")]
    #[case::control("a\u{1}b")]
    #[case::empty("")]
    fn invalid_components_are_rejected(#[case] component: &str) {
        assert!(validate_component(component).is_err(), "{component:?}");
    }

    #[rstest]
    #[case::plain("default")]
    #[case::dashed("my-project")]
    #[case::numbered("proj42")]
    #[case::underscore("snake_case")]
    fn valid_components_pass(#[case] component: &str) {
        assert!(validate_component(component).is_ok());
    }

    #[rstest]
    #[case::none(None, "default")]
    #[case::empty(Some(""), "default")]
    #[case::simple(Some("Payments"), "payments")]
    #[case::spaces(Some("My Cool Project"), "my-cool-project")]
    #[case::traversal(Some("../escape"), "escape")]
    #[case::specials(Some("a/b\\c:d"), "a-b-c-d")]
    #[case::collapsed(Some("a---b"), "a-b")]
    #[case::only_junk(Some("///"), "default")]
    fn project_sanitization(#[case] input: Option<&str>, #[case] expected: &str) {
        assert_eq!(sanitize_project(input), expected);
    }

    #[test]
    fn sanitized_project_is_always_a_valid_component() {
        for label in ["..", "a b c", "UPPER", "%2e", "x/y", "", "日本語"] {
            let sanitized = sanitize_project(Some(label));
            assert!(
                validate_component(&sanitized).is_ok(),
                "{label:?} -> {sanitized:?}"
            );
        }
    }

    #[test]
    fn long_project_labels_are_capped() {
        let long = "x".repeat(500);
        let sanitized = sanitize_project(Some(&long));
        assert!(sanitized.len() <= MAX_PROJECT_LEN);
    }

    #[test]
    fn from_dirs_creates_roots() {
        let temp = tempfile::tempdir().unwrap();
        let roots = Roots::from_dirs(
            temp.path().join("memories"),
            temp.path().join("tasks"),
            temp.path().join("data"),
        )
        .unwrap();
        assert!(roots.memories.is_dir());
        assert!(roots.tasks.is_dir());
        assert!(roots.data.is_dir());
        assert!(roots.contains(&roots.memories.join("default").join("x.md")));
        assert!(!roots.contains(Path::new("/elsewhere")));
    }

    #[test]
    fn traversal_in_configured_root_is_a_sandbox_escape() {
        let temp = tempfile::tempdir().unwrap();
        let err = validate_root(temp.path(), Path::new("../outside")).unwrap_err();
        assert!(
            matches!(
                err,
                crate::error::Error::Path(PathError::OutsideSandbox { .. })
            ),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("outside the configured root"));
    }

    #[test]
    fn project_dir_validates_label() {
        let temp = tempfile::tempdir().unwrap();
        let roots = Roots::from_dirs(
            temp.path().join("m"),
            temp.path().join("t"),
            temp.path().join("d"),
        )
        .unwrap();
        assert!(roots.memory_project_dir("ok-project").is_ok());
        assert!(roots.memory_project_dir("../escape").is_err());
    }
}
