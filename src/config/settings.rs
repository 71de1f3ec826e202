//! Application settings and configuration types.
//!
//! Settings are persisted to `~/.config/adpilot/settings.json` (or XDG
//! equivalent) and loaded at application startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Local storage settings.
    pub storage: StorageSettings,
    /// Messaging defaults.
    pub messaging: MessagingSettings,
    /// Presence heartbeat configuration.
    pub presence: PresenceSettings,
}

/// Local storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Key the automation rule collection is stored under.
    pub rules_key: String,
    /// Override for the local data directory. Platform default when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            rules_key: crate::storage::DEFAULT_RULES_KEY.to_string(),
            data_dir: None,
        }
    }
}

/// Messaging defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingSettings {
    /// Recipient used when no admin profile exists yet.
    pub fallback_support_email: String,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            fallback_support_email: "support@adpilot.io".to_string(),
        }
    }
}

/// Presence heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSettings {
    /// Seconds between activity timestamp stamps.
    pub heartbeat_interval_secs: u64,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
        }
    }
}

impl PresenceSettings {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Settings {
    /// Platform settings file location, `None` when no home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "adpilot", "adpilot")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Loads settings from a JSON file, falling back to defaults when the
    /// file does not exist yet.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.storage.rules_key, "aap_rules");
        assert_eq!(settings.presence.heartbeat_interval_secs, 30);
        assert_eq!(
            settings.presence.heartbeat_interval(),
            std::time::Duration::from_secs(30)
        );
        assert!(!settings.messaging.fallback_support_email.is_empty());
    }

    #[test]
    fn settings_roundtrip() {
        let mut settings = Settings::default();
        settings.storage.rules_key = "custom_rules".to_string();
        settings.presence.heartbeat_interval_secs = 5;

        let json = serde_json::to_string_pretty(&settings).unwrap();
        let deserialized: Settings = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.storage.rules_key, "custom_rules");
        assert_eq!(deserialized.presence.heartbeat_interval_secs, 5);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings::load_or_default(&path).unwrap();
        assert_eq!(settings.storage.rules_key, "aap_rules");
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.messaging.fallback_support_email = "help@x.com".to_string();
        settings.save(&path).unwrap();

        let reloaded = Settings::load_or_default(&path).unwrap();
        assert_eq!(reloaded.messaging.fallback_support_email, "help@x.com");
    }
}
