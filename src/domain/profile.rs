//! User profile domain types.
//!
//! Profiles are rows owned by the hosted backend; this crate reads and
//! writes them through the backend contract and treats local copies as a
//! cache reconciled on every change event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user (or admin) profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Row id assigned by the backend.
    pub id: String,
    /// Primary identity.
    pub email: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Grants access to the privileged directory view.
    pub is_admin: bool,
    /// Beta-application state.
    pub approval_status: ApprovalStatus,
    /// Last activity timestamp. Doubles as the presence signal and the
    /// conversation-recency sort key.
    pub last_message_date: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Creates a pending, non-admin profile.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            full_name: None,
            is_admin: false,
            approval_status: ApprovalStatus::Pending,
            last_message_date: None,
            created_at: Utc::now(),
        }
    }

    /// Returns the display name or email if no name is set.
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.email)
    }
}

/// Beta application state for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `app_settings` row: a single named configuration value editable from
/// the admin console (redirect URLs and the like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSetting {
    pub setting_key: String,
    pub setting_value: String,
}
