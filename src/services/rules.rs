//! Automation rule editing.
//!
//! [`RuleEditor`] owns the in-memory rule collection and an optional active
//! selection, persisting the whole collection through a [`RuleStore`] after
//! every mutation. Persistence failures are logged and the in-memory state
//! kept, so the next successful save writes the current truth.

use tracing::warn;

use crate::domain::{AutomationRule, RuleUpdate};
use crate::storage::RuleStore;

/// Editor over the stored automation rule collection.
#[derive(Debug)]
pub struct RuleEditor {
    store: RuleStore,
    rules: Vec<AutomationRule>,
    active_rule_id: Option<String>,
}

impl RuleEditor {
    /// Loads the persisted collection, seeding templates on first run.
    pub async fn load(store: RuleStore) -> Self {
        let rules = store.load().await;
        Self {
            store,
            rules,
            active_rule_id: None,
        }
    }

    /// The current rule collection.
    pub fn rules(&self) -> &[AutomationRule] {
        &self.rules
    }

    /// The rule currently open for editing, if any.
    pub fn active_rule(&self) -> Option<&AutomationRule> {
        let id = self.active_rule_id.as_deref()?;
        self.rules.iter().find(|r| r.id == id)
    }

    /// Opens a rule for editing. Ignored if the id is unknown.
    pub fn select(&mut self, rule_id: &str) {
        if self.rules.iter().any(|r| r.id == rule_id) {
            self.active_rule_id = Some(rule_id.to_owned());
        }
    }

    /// Closes the editing pane.
    pub fn clear_selection(&mut self) {
        self.active_rule_id = None;
    }

    /// Creates a new rule with editing defaults, selects it, and persists.
    pub async fn create(&mut self) -> AutomationRule {
        let rule = AutomationRule::new();
        self.rules.push(rule.clone());
        self.active_rule_id = Some(rule.id.clone());
        self.persist().await;
        rule
    }

    /// Applies a partial update to one rule and persists.
    pub async fn update(&mut self, rule_id: &str, update: RuleUpdate) {
        let Some(rule) = self.rules.iter_mut().find(|r| r.id == rule_id) else {
            return;
        };
        rule.apply(update);
        self.persist().await;
    }

    /// Flips a rule's enabled flag and persists. Returns the new state.
    pub async fn toggle_enabled(&mut self, rule_id: &str) -> Option<bool> {
        let rule = self.rules.iter_mut().find(|r| r.id == rule_id)?;
        rule.enabled = !rule.enabled;
        let enabled = rule.enabled;
        self.persist().await;
        Some(enabled)
    }

    /// Deletes a rule, clearing the selection if it was open, and persists.
    pub async fn delete(&mut self, rule_id: &str) {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != rule_id);
        if self.rules.len() == before {
            return;
        }
        if self.active_rule_id.as_deref() == Some(rule_id) {
            self.active_rule_id = None;
        }
        self.persist().await;
    }

    /// Appends a default condition row to a rule and persists.
    pub async fn add_condition(&mut self, rule_id: &str) {
        let Some(rule) = self.rules.iter_mut().find(|r| r.id == rule_id) else {
            return;
        };
        rule.conditions.push(AutomationRule::default_condition());
        self.persist().await;
    }

    /// Removes one condition row from a rule and persists.
    pub async fn remove_condition(&mut self, rule_id: &str, condition_id: &str) {
        let Some(rule) = self.rules.iter_mut().find(|r| r.id == rule_id) else {
            return;
        };
        rule.conditions.retain(|c| c.id != condition_id);
        self.persist().await;
    }

    /// Appends a default action row to a rule and persists.
    pub async fn add_action(&mut self, rule_id: &str) {
        let Some(rule) = self.rules.iter_mut().find(|r| r.id == rule_id) else {
            return;
        };
        rule.actions.push(AutomationRule::default_action());
        self.persist().await;
    }

    /// Removes one action row from a rule and persists.
    pub async fn remove_action(&mut self, rule_id: &str, action_id: &str) {
        let Some(rule) = self.rules.iter_mut().find(|r| r.id == rule_id) else {
            return;
        };
        rule.actions.retain(|a| a.id != action_id);
        self.persist().await;
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save(&self.rules).await {
            warn!(error = %e, "failed to persist automation rules");
        }
    }
}
