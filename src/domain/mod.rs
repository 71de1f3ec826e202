//! Domain layer types for the AdPilot customer portal.
//!
//! This module contains the core domain types used throughout the crate:
//! automation rules, user profiles, and chat messages.

mod message;
mod profile;
mod rule;

pub use message::{
    conversation_key, flag_important, strip_important, ChatMessage, Message, IMPORTANT_MARKER,
};
pub use profile::{AppSetting, ApprovalStatus, UserProfile};
pub use rule::{
    templates, Action, ActionType, AutomationRule, Condition, Metric, Operator, RuleUpdate,
    Schedule, Trigger,
};
