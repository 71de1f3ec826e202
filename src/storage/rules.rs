//! Rule collection persistence.
//!
//! The whole rule collection is serialized under one key on every save.
//! A missing or unparseable snapshot degrades to the built-in templates and
//! is never surfaced as an error.

use std::sync::Arc;

use crate::domain::{templates, AutomationRule};

use super::kv::{KeyValueStore, Result};

/// Default storage key for the rule collection.
pub const DEFAULT_RULES_KEY: &str = "aap_rules";

/// Loads and saves the automation rule collection through a
/// [`KeyValueStore`].
#[derive(Clone)]
pub struct RuleStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl RuleStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_RULES_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Returns the persisted collection, or the three built-in templates
    /// when nothing usable is stored. Storage failures and corrupt snapshots
    /// both fall back; this never errors.
    pub async fn load(&self) -> Vec<AutomationRule> {
        let raw = match self.store.get(&self.key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "rule storage unavailable, using templates");
                return templates();
            }
        };

        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(rules) => rules,
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "corrupt rule snapshot, using templates");
                    templates()
                }
            },
            None => templates(),
        }
    }

    /// Re-serializes the entire collection. Writes are total and idempotent.
    pub async fn save(&self, rules: &[AutomationRule]) -> Result<()> {
        let raw = serde_json::to_string(rules)?;
        self.store.set(&self.key, &raw).await
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore").field("key", &self.key).finish()
    }
}
