//! Admin user administration.
//!
//! [`DirectoryService`] gates the admin surface behind a server-side profile
//! check, maintains the user roster with a derived search/filter view, and
//! applies approval decisions optimistically with rollback on failure.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::app::events::{EventBus, PortalEvent};
use crate::backend::{BackendError, PortalBackend, ProfileEvent};
use crate::domain::{AppSetting, ApprovalStatus, UserProfile};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("no profile found for {0}")]
    ProfileNotFound(String),

    #[error("{0} is not an administrator")]
    NotAdmin(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Roster filter on approval status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Status(ApprovalStatus),
}

#[derive(Debug, Default)]
struct Roster {
    users: Vec<UserProfile>,
    search: String,
    status_filter: StatusFilter,
}

/// User administration over the hosted profile table.
pub struct DirectoryService {
    backend: Arc<dyn PortalBackend>,
    events: EventBus,
    roster: Mutex<Roster>,
}

impl DirectoryService {
    pub fn new(backend: Arc<dyn PortalBackend>, events: EventBus) -> Self {
        Self {
            backend,
            events,
            roster: Mutex::new(Roster::default()),
        }
    }

    /// Verifies that `email` belongs to an admin profile. On success the
    /// profile's activity timestamp is stamped (best effort) and the profile
    /// returned; non-admins and unknown addresses are rejected.
    pub async fn verify_admin(&self, email: &str) -> Result<UserProfile, DirectoryError> {
        let profile = self
            .backend
            .fetch_profile(email)
            .await?
            .ok_or_else(|| DirectoryError::ProfileNotFound(email.to_owned()))?;

        if !profile.is_admin {
            return Err(DirectoryError::NotAdmin(email.to_owned()));
        }

        if let Err(e) = self.backend.touch_last_active(email, Utc::now()).await {
            debug!(email, error = %e, "failed to stamp admin activity");
        }
        Ok(profile)
    }

    /// Reloads the roster from the backend.
    pub async fn refresh(&self) -> Result<(), DirectoryError> {
        let users = self.backend.list_profiles().await?;
        self.roster.lock().unwrap().users = users;
        Ok(())
    }

    /// The full roster in backend order (recent activity first).
    pub fn users(&self) -> Vec<UserProfile> {
        self.roster.lock().unwrap().users.clone()
    }

    pub fn set_search(&self, query: impl Into<String>) {
        self.roster.lock().unwrap().search = query.into();
    }

    pub fn set_status_filter(&self, filter: StatusFilter) {
        self.roster.lock().unwrap().status_filter = filter;
    }

    /// The roster narrowed by the search query (case-insensitive over email
    /// and full name) and the status filter. Row order is preserved.
    pub fn visible(&self) -> Vec<UserProfile> {
        let roster = self.roster.lock().unwrap();
        let query = roster.search.trim().to_lowercase();
        roster
            .users
            .iter()
            .filter(|u| match roster.status_filter {
                StatusFilter::All => true,
                StatusFilter::Status(status) => u.approval_status == status,
            })
            .filter(|u| {
                query.is_empty()
                    || u.email.to_lowercase().contains(&query)
                    || u.full_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    /// Sets a user's approval status, updating the roster immediately and
    /// rolling the row back if the backend write fails.
    pub async fn set_approval_status(
        &self,
        user_id: &str,
        status: ApprovalStatus,
    ) -> Result<(), DirectoryError> {
        let previous = {
            let mut roster = self.roster.lock().unwrap();
            let Some(user) = roster.users.iter_mut().find(|u| u.id == user_id) else {
                return Err(DirectoryError::ProfileNotFound(user_id.to_owned()));
            };
            let previous = user.approval_status;
            user.approval_status = status;
            previous
        };

        if let Err(e) = self.backend.set_approval_status(user_id, status).await {
            warn!(user_id, error = %e, "approval update failed, rolling back");
            let mut roster = self.roster.lock().unwrap();
            if let Some(user) = roster.users.iter_mut().find(|u| u.id == user_id) {
                user.approval_status = previous;
            }
            return Err(e.into());
        }

        let email = self
            .roster
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.email.clone());
        if let Some(email) = email {
            self.events
                .publish(PortalEvent::ApprovalStatusChanged { email, status });
        }
        Ok(())
    }

    /// Applies a profile change-feed event to the roster. New signups land at
    /// the top and raise [`PortalEvent::UserJoined`].
    pub fn handle_profile_event(&self, event: ProfileEvent) {
        match event {
            ProfileEvent::Inserted(profile) => {
                let email = profile.email.clone();
                {
                    let mut roster = self.roster.lock().unwrap();
                    if roster.users.iter().any(|u| u.id == profile.id) {
                        return;
                    }
                    roster.users.insert(0, profile);
                }
                self.events.publish(PortalEvent::UserJoined { email });
            }
            ProfileEvent::Updated(profile) => {
                let mut roster = self.roster.lock().unwrap();
                if let Some(user) = roster.users.iter_mut().find(|u| u.id == profile.id) {
                    *user = profile;
                }
            }
        }
    }

    /// Drives the profile change feed until it closes.
    pub async fn run(&self, mut feed: crate::backend::Subscription<ProfileEvent>) {
        while let Some(event) = feed.recv().await {
            self.handle_profile_event(event);
        }
        debug!("profile change feed closed");
    }

    /// All app settings rows.
    pub async fn app_settings(&self) -> Result<Vec<AppSetting>, DirectoryError> {
        Ok(self.backend.fetch_app_settings().await?)
    }

    /// Writes a batch of app settings key by key. The first failure aborts
    /// the batch; earlier writes are not rolled back.
    pub async fn save_app_settings(
        &self,
        settings: &[(String, String)],
    ) -> Result<(), DirectoryError> {
        for (key, value) in settings {
            self.backend.update_app_setting(key, value).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DirectoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryService").finish_non_exhaustive()
    }
}
