//! Runtime settings (`<dataRoot>/settings.json`).
//!
//! Precedence: environment overrides the settings file, which overrides
//! the built-in defaults.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable toggling periodic backups (`true`/`false`).
pub const ENV_AUTO_BACKUP: &str = "RECALL_AUTO_BACKUP";
/// Environment variable toggling semantic search (`true`/`false`).
pub const ENV_SEMANTIC_SEARCH: &str = "RECALL_SEMANTIC_SEARCH";
/// Environment variable overriding the backup interval in milliseconds.
pub const ENV_BACKUP_INTERVAL_MS: &str = "RECALL_BACKUP_INTERVAL_MS";

/// Semantic-search provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticProvider {
    /// The built-in feature-hashed embedder.
    #[default]
    Builtin,
    /// Semantic search disabled.
    None,
}

/// Authentication knobs. Token handling itself lives outside the core;
/// the gateway only refuses to start without a token when enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Whether the gateway requires a token.
    pub enabled: bool,
}

/// Feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeatureSettings {
    /// Enable periodic snapshots.
    pub auto_backup: bool,

    /// Milliseconds between periodic snapshots.
    pub backup_interval: u64,

    /// Rotation count: how many snapshots to keep.
    pub max_backups: usize,

    /// Toggle the vector index.
    pub enable_semantic_search: bool,

    /// Which semantic provider to use.
    pub semantic_search_provider: SemanticProvider,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            auto_backup: true,
            backup_interval: 60 * 60 * 1000,
            max_backups: 10,
            enable_semantic_search: true,
            semantic_search_provider: SemanticProvider::Builtin,
        }
    }
}

/// The full settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Authentication knobs.
    pub authentication: AuthSettings,

    /// Feature toggles.
    pub features: FeatureSettings,
}

impl Settings {
    /// Load settings from `settings.json` under the data root, then
    /// apply environment overrides. A missing or malformed file yields
    /// the defaults (malformed files are logged and ignored).
    #[must_use]
    pub fn load(data_root: &Path) -> Self {
        let file = data_root.join("settings.json");
        let mut settings = match std::fs::read_to_string(&file) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(file = %file.display(), error = %e, "ignoring malformed settings.json");
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        settings.apply_env_overrides();
        settings
    }

    /// Persist settings to `settings.json` under the data root.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, data_root: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(data_root.join("settings.json"), raw)?;
        Ok(())
    }

    /// The periodic backup interval as a [`Duration`].
    #[must_use]
    pub fn backup_interval(&self) -> Duration {
        Duration::from_millis(self.features.backup_interval)
    }

    /// Whether the vector index should be probed at startup.
    #[must_use]
    pub fn semantic_search_enabled(&self) -> bool {
        self.features.enable_semantic_search
            && self.features.semantic_search_provider != SemanticProvider::None
    }

    fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_bool(ENV_AUTO_BACKUP) {
            self.features.auto_backup = enabled;
        }
        if let Some(enabled) = env_bool(ENV_SEMANTIC_SEARCH) {
            self.features.enable_semantic_search = enabled;
        }
        if let Ok(raw) = std::env::var(ENV_BACKUP_INTERVAL_MS) {
            if let Ok(ms) = raw.parse::<u64>() {
                self.features.backup_interval = ms;
            }
        }
    }
}

fn env_bool(var: &str) -> Option<bool> {
    match std::env::var(var).ok()?.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert!(settings.features.auto_backup);
        assert_eq!(settings.features.max_backups, 10);
        assert_eq!(settings.backup_interval(), Duration::from_secs(3600));
        assert!(settings.semantic_search_enabled());
        assert!(!settings.authentication.enabled);
    }

    #[test]
    fn none_provider_disables_semantic_search() {
        let mut settings = Settings::default();
        settings.features.semantic_search_provider = SemanticProvider::None;
        assert!(!settings.semantic_search_enabled());
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.features.max_backups = 3;
        settings.features.backup_interval = 5000;
        settings.save(temp.path()).unwrap();

        let loaded = Settings::load(temp.path());
        assert_eq!(loaded.features.max_backups, 3);
        assert_eq!(loaded.features.backup_interval, 5000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("settings.json"), "{not json").unwrap();
        let loaded = Settings::load(temp.path());
        assert_eq!(loaded.features.max_backups, 10);
    }

    #[test]
    fn settings_json_uses_camel_case_keys() {
        let raw = serde_json::to_string(&Settings::default()).unwrap();
        assert!(raw.contains("\"autoBackup\""));
        assert!(raw.contains("\"backupInterval\""));
        assert!(raw.contains("\"enableSemanticSearch\""));
        assert!(raw.contains("\"semanticSearchProvider\""));
    }
}
