//! In-memory reference backend.
//!
//! Implements the full [`PortalBackend`] contract over process-local state,
//! fanning change events out to subscribers synchronously on each write.
//! Tests use it to script failure modes ("insert returns no row", "next
//! write fails") without a network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::domain::{AppSetting, ApprovalStatus, Message, UserProfile};

use super::traits::PortalBackend;
use super::types::{
    BackendError, MessageEvent, NewMessage, ProfileEvent, Result, Subscription, SubscriptionGuard,
};

#[derive(Default)]
struct State {
    session_email: Option<String>,
    profiles: Vec<UserProfile>,
    messages: Vec<Message>,
    settings: Vec<AppSetting>,
    next_row_id: u64,
    suppress_inserted_rows: bool,
    fail_next_write: bool,
    message_subs: HashMap<u64, mpsc::UnboundedSender<MessageEvent>>,
    profile_subs: HashMap<u64, mpsc::UnboundedSender<ProfileEvent>>,
    next_sub_id: u64,
}

impl State {
    fn take_write_failure(&mut self) -> Result<()> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(BackendError::Service("injected write failure".into()));
        }
        Ok(())
    }

    fn emit_message(&mut self, event: MessageEvent) {
        self.message_subs
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    fn emit_profile(&mut self, event: ProfileEvent) {
        self.profile_subs
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// Backend over in-process state, for tests and offline development.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Sets the active session email.
    pub fn set_session(&self, email: impl Into<String>) {
        self.lock().session_email = Some(email.into());
    }

    /// Seeds a profile row and emits an insert event.
    pub fn add_profile(&self, profile: UserProfile) {
        let mut state = self.lock();
        state.profiles.push(profile.clone());
        state.emit_profile(ProfileEvent::Inserted(profile));
    }

    /// Seeds an app settings row.
    pub fn add_setting(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().settings.push(AppSetting {
            setting_key: key.into(),
            setting_value: value.into(),
        });
    }

    /// Makes subsequent message inserts succeed without echoing the stored
    /// row, like a service configured without `RETURNING`.
    pub fn suppress_inserted_rows(&self, suppress: bool) {
        self.lock().suppress_inserted_rows = suppress;
    }

    /// Makes the next write operation fail with a service error.
    pub fn fail_next_write(&self) {
        self.lock().fail_next_write = true;
    }

    /// Inserts a message as if another session had written it: the row is
    /// stored and the insert event fans out to subscribers.
    pub fn inject_message(&self, message: NewMessage) -> Message {
        let mut state = self.lock();
        let row = Self::store_message(&mut state, message);
        state.messages.push(row.clone());
        state.emit_message(MessageEvent::Inserted(row.clone()));
        row
    }

    /// Snapshot of every stored message, insertion order.
    pub fn stored_messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Snapshot of one profile by email.
    pub fn stored_profile(&self, email: &str) -> Option<UserProfile> {
        self.lock()
            .profiles
            .iter()
            .find(|p| p.email == email)
            .cloned()
    }

    fn store_message(state: &mut State, payload: NewMessage) -> Message {
        state.next_row_id += 1;
        Message {
            id: format!("msg-{}", state.next_row_id),
            sender_email: payload.sender_email,
            receiver_email: payload.receiver_email,
            message_text: payload.message_text,
            conversation_id: payload.conversation_id,
            created_at: Utc::now(),
            read_status: false,
            read_at: None,
        }
    }

    fn sorted_profiles(mut profiles: Vec<UserProfile>) -> Vec<UserProfile> {
        profiles.sort_by(|a, b| {
            // Most recent activity first, rows without a timestamp last,
            // then newest rows first.
            b.last_message_date
                .cmp(&a.last_message_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        profiles
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl PortalBackend for InMemoryBackend {
    async fn session_email(&self) -> Result<Option<String>> {
        Ok(self.lock().session_email.clone())
    }

    async fn sign_out(&self) -> Result<()> {
        let mut state = self.lock();
        state.take_write_failure()?;
        state.session_email = None;
        Ok(())
    }

    async fn fetch_profile(&self, email: &str) -> Result<Option<UserProfile>> {
        Ok(self.stored_profile(email))
    }

    async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        Ok(Self::sorted_profiles(self.lock().profiles.clone()))
    }

    async fn most_recent_admin(&self) -> Result<Option<UserProfile>> {
        let admins: Vec<_> = self
            .lock()
            .profiles
            .iter()
            .filter(|p| p.is_admin)
            .cloned()
            .collect();
        Ok(Self::sorted_profiles(admins).into_iter().next())
    }

    async fn set_approval_status(&self, user_id: &str, status: ApprovalStatus) -> Result<()> {
        let mut state = self.lock();
        state.take_write_failure()?;

        let Some(profile) = state.profiles.iter_mut().find(|p| p.id == user_id) else {
            return Err(BackendError::Service(format!("no profile {user_id}")));
        };
        profile.approval_status = status;
        let updated = profile.clone();
        state.emit_profile(ProfileEvent::Updated(updated));
        Ok(())
    }

    async fn touch_last_active(&self, email: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        state.take_write_failure()?;

        if let Some(profile) = state.profiles.iter_mut().find(|p| p.email == email) {
            profile.last_message_date = Some(at);
            let updated = profile.clone();
            state.emit_profile(ProfileEvent::Updated(updated));
        }
        Ok(())
    }

    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut rows: Vec<_> = self
            .lock()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn fetch_messages_for(&self, email: &str) -> Result<Vec<Message>> {
        let mut rows: Vec<_> = self
            .lock()
            .messages
            .iter()
            .filter(|m| m.sender_email == email || m.receiver_email == email)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Option<Message>> {
        let mut state = self.lock();
        state.take_write_failure()?;

        let row = Self::store_message(&mut state, message);
        state.messages.push(row.clone());
        state.emit_message(MessageEvent::Inserted(row.clone()));

        if state.suppress_inserted_rows {
            Ok(None)
        } else {
            Ok(Some(row))
        }
    }

    async fn insert_messages(&self, messages: Vec<NewMessage>) -> Result<()> {
        let mut state = self.lock();
        state.take_write_failure()?;

        for payload in messages {
            let row = Self::store_message(&mut state, payload);
            state.messages.push(row.clone());
            state.emit_message(MessageEvent::Inserted(row));
        }
        Ok(())
    }

    async fn mark_read(&self, ids: &[String], read_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        state.take_write_failure()?;

        let mut updated = Vec::new();
        for message in state.messages.iter_mut() {
            if ids.contains(&message.id) && !message.read_status {
                message.read_status = true;
                message.read_at = Some(read_at);
                updated.push(message.clone());
            }
        }
        for row in updated {
            state.emit_message(MessageEvent::Updated(row));
        }
        Ok(())
    }

    async fn unread_counts(&self, receiver_email: &str) -> Result<HashMap<String, u32>> {
        let mut counts = HashMap::new();
        for message in self.lock().messages.iter() {
            if message.receiver_email == receiver_email && !message.read_status {
                *counts.entry(message.sender_email.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn fetch_app_settings(&self) -> Result<Vec<AppSetting>> {
        Ok(self.lock().settings.clone())
    }

    async fn update_app_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.take_write_failure()?;

        match state.settings.iter_mut().find(|s| s.setting_key == key) {
            Some(setting) => setting.setting_value = value.to_owned(),
            None => state.settings.push(AppSetting {
                setting_key: key.to_owned(),
                setting_value: value.to_owned(),
            }),
        }
        Ok(())
    }

    fn subscribe_messages(&self) -> Subscription<MessageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.message_subs.insert(id, tx);

        let shared = Arc::clone(&self.state);
        Subscription::new(
            rx,
            SubscriptionGuard::new(move || {
                shared.lock().unwrap().message_subs.remove(&id);
            }),
        )
    }

    fn subscribe_profiles(&self) -> Subscription<ProfileEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.profile_subs.insert(id, tx);

        let shared = Arc::clone(&self.state);
        Subscription::new(
            rx,
            SubscriptionGuard::new(move || {
                shared.lock().unwrap().profile_subs.remove(&id);
            }),
        )
    }
}
