//! The hosted backend contract.
//!
//! The portal is a pure client of a hosted data service exposing three
//! capability groups: row storage with filter/order queries, change-feed
//! subscriptions, and session identity. This trait is the whole surface the
//! rest of the crate is allowed to touch; production wires an HTTP-backed
//! implementation, tests and offline development use
//! [`InMemoryBackend`](super::InMemoryBackend).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AppSetting, ApprovalStatus, Message, UserProfile};

use super::types::{MessageEvent, NewMessage, ProfileEvent, Result, Subscription};

#[async_trait]
pub trait PortalBackend: Send + Sync {
    // --- session identity ---

    /// Email of the active session, if any.
    async fn session_email(&self) -> Result<Option<String>>;

    /// Ends the active session.
    async fn sign_out(&self) -> Result<()>;

    // --- profile rows ---

    /// Fetches one profile by email.
    async fn fetch_profile(&self, email: &str) -> Result<Option<UserProfile>>;

    /// All profiles, most recent activity first (nulls last), then creation
    /// time descending.
    async fn list_profiles(&self) -> Result<Vec<UserProfile>>;

    /// The admin profile with the most recent activity timestamp. Used both
    /// as the default message recipient and as the presence source.
    async fn most_recent_admin(&self) -> Result<Option<UserProfile>>;

    /// Sets a profile's approval status.
    async fn set_approval_status(&self, user_id: &str, status: ApprovalStatus) -> Result<()>;

    /// Stamps a profile's activity timestamp.
    async fn touch_last_active(&self, email: &str, at: DateTime<Utc>) -> Result<()>;

    // --- message rows ---

    /// All messages for a conversation key, `created_at` ascending.
    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// All messages sent or received by the given address, newest first.
    async fn fetch_messages_for(&self, email: &str) -> Result<Vec<Message>>;

    /// Inserts one message. Returns the stored row when the service echoes
    /// it back; `None` when the write succeeded without returning a row.
    async fn insert_message(&self, message: NewMessage) -> Result<Option<Message>>;

    /// Inserts a batch of messages as one request. Partial success is not
    /// rolled back; any failure is reported as a single error.
    async fn insert_messages(&self, messages: Vec<NewMessage>) -> Result<()>;

    /// Marks the given message rows read, stamping `read_at`.
    async fn mark_read(&self, ids: &[String], read_at: DateTime<Utc>) -> Result<()>;

    /// Unread message counts addressed to `receiver_email`, keyed by sender.
    async fn unread_counts(&self, receiver_email: &str) -> Result<HashMap<String, u32>>;

    // --- app settings rows ---

    /// All app settings rows.
    async fn fetch_app_settings(&self) -> Result<Vec<AppSetting>>;

    /// Updates one app setting by key.
    async fn update_app_setting(&self, key: &str, value: &str) -> Result<()>;

    // --- change feeds ---

    /// Live insert/update events for the messages table.
    fn subscribe_messages(&self) -> Subscription<MessageEvent>;

    /// Live insert/update events for the profiles table.
    fn subscribe_profiles(&self) -> Subscription<ProfileEvent>;
}
