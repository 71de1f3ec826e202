//! Portal wiring and session lifecycle.
//!
//! [`Portal`] composes the backend client, local storage, and settings into
//! the two session shapes the product has: a customer session pinned to the
//! support conversation, and an admin session carrying the directory, the
//! inbox, and the presence heartbeat. Sessions own their change-feed driver
//! tasks and stop them on drop.

pub mod events;

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::backend::{PortalBackend, ProfileEvent};
use crate::config::Settings;
use crate::domain::UserProfile;
use crate::services::{
    merge_presence_source, presence_now, DirectoryService, Heartbeat, IdentityResolver,
    MessagingService, Presence, RuleEditor,
};
use crate::storage::{KeyValueStore, RuleStore};

use events::{EventBus, PortalEvent};

/// The portal's composition root.
pub struct Portal {
    backend: Arc<dyn PortalBackend>,
    local: Arc<dyn KeyValueStore>,
    settings: Settings,
    events: EventBus,
}

impl Portal {
    pub fn new(
        backend: Arc<dyn PortalBackend>,
        local: Arc<dyn KeyValueStore>,
        settings: Settings,
    ) -> Self {
        Self {
            backend,
            local,
            settings,
            events: EventBus::new(),
        }
    }

    /// The shared event bus. Clones observe the same subscribers.
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn identity(&self) -> IdentityResolver {
        IdentityResolver::new(Arc::clone(&self.backend), Arc::clone(&self.local))
    }

    /// Loads the automation rule editor over local storage.
    pub async fn rule_editor(&self) -> RuleEditor {
        let store = RuleStore::with_key(Arc::clone(&self.local), &self.settings.storage.rules_key);
        RuleEditor::load(store).await
    }

    /// Opens a customer session: resolves the signed-in email, loads the
    /// profile, and opens the support conversation against the most recently
    /// active admin (or the configured fallback address). Returns `None`
    /// when nobody is signed in.
    pub async fn open_user_session(&self, email_hint: Option<&str>) -> Result<Option<UserSession>> {
        let Some(email) = self.identity().resolve(email_hint).await? else {
            return Ok(None);
        };
        let profile = self
            .backend
            .fetch_profile(&email)
            .await?
            .ok_or_else(|| anyhow!("no account found for {email}"))?;

        let support = match self.backend.most_recent_admin().await {
            Ok(support) => support,
            Err(e) => {
                warn!(error = %e, "could not determine the support contact");
                None
            }
        };

        let messaging = Arc::new(MessagingService::new(
            Arc::clone(&self.backend),
            self.events.clone(),
            email.clone(),
        ));

        let state = Arc::new(UserState {
            events: self.events.clone(),
            fallback_support_email: self.settings.messaging.fallback_support_email.clone(),
            profile: Mutex::new(profile),
            support: Mutex::new(support),
        });
        messaging.open_conversation(&state.support_email()).await?;

        let message_feed = {
            let messaging = Arc::clone(&messaging);
            let feed = self.backend.subscribe_messages();
            tokio::spawn(async move { messaging.run(feed).await })
        };
        let profile_feed = {
            let state = Arc::clone(&state);
            let mut feed = self.backend.subscribe_profiles();
            tokio::spawn(async move {
                while let Some(event) = feed.recv().await {
                    state.apply_profile_event(event);
                }
            })
        };

        Ok(Some(UserSession {
            state,
            messaging,
            tasks: vec![message_feed, profile_feed],
        }))
    }

    /// Opens an admin session: verifies the admin gate, loads the roster and
    /// unread counters, and starts the presence heartbeat. Returns `None`
    /// when nobody is signed in; non-admins are rejected with
    /// [`DirectoryError::NotAdmin`](crate::services::DirectoryError).
    pub async fn open_admin_session(
        &self,
        email_hint: Option<&str>,
    ) -> Result<Option<AdminSession>> {
        let Some(email) = self.identity().resolve(email_hint).await? else {
            return Ok(None);
        };

        let directory = Arc::new(DirectoryService::new(
            Arc::clone(&self.backend),
            self.events.clone(),
        ));
        let profile = directory.verify_admin(&email).await?;
        directory.refresh().await?;

        let messaging = Arc::new(MessagingService::new(
            Arc::clone(&self.backend),
            self.events.clone(),
            email.clone(),
        ));
        messaging.fetch_unread_counts().await?;

        let heartbeat = Heartbeat::start(
            Arc::clone(&self.backend),
            email,
            self.settings.presence.heartbeat_interval(),
        );

        let message_feed = {
            let messaging = Arc::clone(&messaging);
            let feed = self.backend.subscribe_messages();
            tokio::spawn(async move { messaging.run(feed).await })
        };
        let profile_feed = {
            let directory = Arc::clone(&directory);
            let feed = self.backend.subscribe_profiles();
            tokio::spawn(async move { directory.run(feed).await })
        };

        Ok(Some(AdminSession {
            profile,
            messaging,
            directory,
            heartbeat,
            tasks: vec![message_feed, profile_feed],
        }))
    }
}

impl std::fmt::Debug for Portal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portal").finish_non_exhaustive()
    }
}

struct UserState {
    events: EventBus,
    fallback_support_email: String,
    profile: Mutex<UserProfile>,
    support: Mutex<Option<UserProfile>>,
}

impl UserState {
    fn support_email(&self) -> String {
        self.support
            .lock()
            .unwrap()
            .as_ref()
            .map(|p| p.email.clone())
            .unwrap_or_else(|| self.fallback_support_email.clone())
    }

    fn apply_profile_event(&self, event: ProfileEvent) {
        let (ProfileEvent::Inserted(updated) | ProfileEvent::Updated(updated)) = event;

        {
            let mut profile = self.profile.lock().unwrap();
            if updated.email == profile.email {
                if updated.approval_status != profile.approval_status {
                    self.events.publish(PortalEvent::ApprovalStatusChanged {
                        email: updated.email.clone(),
                        status: updated.approval_status,
                    });
                }
                *profile = updated.clone();
            }
        }

        if updated.is_admin {
            let mut support = self.support.lock().unwrap();
            let current = support.take();
            *support = Some(merge_presence_source(current, updated));
        }
    }
}

/// A signed-in customer session.
pub struct UserSession {
    state: Arc<UserState>,
    messaging: Arc<MessagingService>,
    tasks: Vec<JoinHandle<()>>,
}

impl UserSession {
    /// The viewer's profile as last seen.
    pub fn profile(&self) -> UserProfile {
        self.state.profile.lock().unwrap().clone()
    }

    pub fn messaging(&self) -> Arc<MessagingService> {
        Arc::clone(&self.messaging)
    }

    /// Current support recipient address.
    pub fn support_email(&self) -> String {
        self.state.support_email()
    }

    /// Presence label for the support contact.
    pub fn support_presence(&self) -> Presence {
        let last_active = self
            .state
            .support
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|p| p.last_message_date);
        presence_now(last_active)
    }

    /// Sends a message to the support contact.
    pub async fn send_to_support(&self, text: &str) -> Result<crate::domain::Message> {
        self.messaging.send(&self.support_email(), text).await
    }

    /// Stops the session's background tasks. Also happens on drop.
    pub fn close(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for UserSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession").finish_non_exhaustive()
    }
}

/// A signed-in admin session.
pub struct AdminSession {
    profile: UserProfile,
    messaging: Arc<MessagingService>,
    directory: Arc<DirectoryService>,
    heartbeat: Heartbeat,
    tasks: Vec<JoinHandle<()>>,
}

impl AdminSession {
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn messaging(&self) -> Arc<MessagingService> {
        Arc::clone(&self.messaging)
    }

    pub fn directory(&self) -> Arc<DirectoryService> {
        Arc::clone(&self.directory)
    }

    /// The customer inbox: non-admin profiles, anyone with unread messages
    /// first, then most recent activity.
    pub fn inbox(&self) -> Vec<UserProfile> {
        let mut users: Vec<_> = self
            .directory
            .users()
            .into_iter()
            .filter(|u| !u.is_admin)
            .collect();
        MessagingService::sort_inbox(&mut users, &self.messaging.unread_counts());
        users
    }

    /// Stops the heartbeat and background tasks. Also happens on drop.
    pub fn close(&self) {
        self.heartbeat.stop();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AdminSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSession")
            .field("profile", &self.profile.email)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::domain::ApprovalStatus;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn admin(id: &str, email: &str) -> UserProfile {
        let mut p = UserProfile::new(id, email);
        p.is_admin = true;
        p
    }

    fn portal(backend: Arc<InMemoryBackend>) -> Portal {
        Portal::new(backend, Arc::new(MemoryStore::new()), Settings::default())
    }

    #[tokio::test]
    async fn user_session_opens_support_conversation() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_profile(UserProfile::new("1", "user@x.com"));
        backend.add_profile(admin("2", "admin@x.com"));

        let portal = portal(backend);
        let session = portal
            .open_user_session(Some("user@x.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(session.profile().email, "user@x.com");
        assert_eq!(session.support_email(), "admin@x.com");
        assert_eq!(
            session.messaging().open_with().as_deref(),
            Some("admin@x.com")
        );
    }

    #[tokio::test]
    async fn user_session_falls_back_when_no_admin_exists() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_profile(UserProfile::new("1", "user@x.com"));

        let portal = portal(backend);
        let session = portal
            .open_user_session(Some("user@x.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(session.support_email(), "support@adpilot.io");
        assert_eq!(session.support_presence(), Presence::Unknown);
    }

    #[tokio::test]
    async fn nobody_signed_in_yields_no_session() {
        let portal = portal(Arc::new(InMemoryBackend::new()));
        assert!(portal.open_user_session(None).await.unwrap().is_none());
        assert!(portal.open_admin_session(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_account_is_an_error() {
        let portal = portal(Arc::new(InMemoryBackend::new()));
        assert!(portal
            .open_user_session(Some("ghost@x.com"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn admin_session_rejects_non_admins() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_profile(UserProfile::new("1", "user@x.com"));

        let portal = portal(backend);
        let err = portal
            .open_admin_session(Some("user@x.com"))
            .await
            .unwrap_err();
        assert!(err
            .downcast_ref::<crate::services::DirectoryError>()
            .is_some());
    }

    #[tokio::test]
    async fn admin_session_loads_roster_and_unread() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_profile(admin("1", "admin@x.com"));
        backend.add_profile(UserProfile::new("2", "user@x.com"));
        backend.inject_message(crate::backend::NewMessage::new(
            "user@x.com",
            "admin@x.com",
            "help please",
        ));

        let portal = portal(backend);
        let session = portal
            .open_admin_session(Some("admin@x.com"))
            .await
            .unwrap()
            .unwrap();

        assert!(session.profile().is_admin);
        let inbox = session.inbox();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].email, "user@x.com");
        assert_eq!(session.messaging().unread_count("user@x.com"), 1);
        session.close();
    }

    #[tokio::test]
    async fn approval_change_reaches_user_session() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_profile(UserProfile::new("1", "user@x.com"));

        let portal = portal(backend.clone());
        let events = portal.events();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.subscribe(move |event| {
            if let PortalEvent::ApprovalStatusChanged { status, .. } = event {
                sink.lock().unwrap().push(*status);
            }
        });

        let session = portal
            .open_user_session(Some("user@x.com"))
            .await
            .unwrap()
            .unwrap();

        backend
            .set_approval_status("1", ApprovalStatus::Approved)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            session.profile().approval_status,
            ApprovalStatus::Approved
        );
        assert_eq!(seen.lock().unwrap().as_slice(), [ApprovalStatus::Approved]);
    }
}
