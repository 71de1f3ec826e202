//! Chat between customers and support admins.
//!
//! [`MessagingService`] holds one session's view of the message table: the
//! currently open conversation, per-sender unread counters, and the
//! optimistic/confirmed reconciliation that keeps a sent message from
//! appearing twice when the change feed echoes it back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::debug;

use crate::app::events::{EventBus, Notification, PortalEvent};
use crate::backend::{MessageEvent, NewMessage, PortalBackend, Subscription};
use crate::domain::{conversation_key, flag_important, ChatMessage, Message, UserProfile};

/// Characters of message text carried in a new-message notification.
const PREVIEW_LEN: usize = 80;

#[derive(Debug, Default)]
struct ChatState {
    /// Counterpart email of the open conversation, if any.
    open_with: Option<String>,
    conversation: Vec<ChatMessage>,
    /// Unread counts keyed by sender email. Absent means zero.
    unread: HashMap<String, u32>,
}

/// One session's messaging state over the hosted message table.
pub struct MessagingService {
    backend: Arc<dyn PortalBackend>,
    events: EventBus,
    viewer: String,
    state: Mutex<ChatState>,
}

impl MessagingService {
    pub fn new(backend: Arc<dyn PortalBackend>, events: EventBus, viewer: impl Into<String>) -> Self {
        Self {
            backend,
            events,
            viewer: viewer.into(),
            state: Mutex::new(ChatState::default()),
        }
    }

    /// The signed-in email this service speaks for.
    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    /// Opens the conversation with `counterpart`: fetches the history oldest
    /// first, marks every message addressed to the viewer read in one batch,
    /// and zeroes the counterpart's unread counter.
    pub async fn open_conversation(&self, counterpart: &str) -> Result<Vec<Message>> {
        let key = conversation_key(&self.viewer, counterpart);
        let mut rows = self.backend.fetch_conversation(&key).await?;

        let unread_ids: Vec<String> = rows
            .iter()
            .filter(|m| m.receiver_email == self.viewer && !m.read_status)
            .map(|m| m.id.clone())
            .collect();
        if !unread_ids.is_empty() {
            let now = Utc::now();
            self.backend.mark_read(&unread_ids, now).await?;
            for row in rows.iter_mut().filter(|m| unread_ids.contains(&m.id)) {
                row.read_status = true;
                row.read_at = Some(now);
            }
        }

        {
            let mut chat = self.state.lock().unwrap();
            chat.open_with = Some(counterpart.to_owned());
            chat.conversation = rows.iter().cloned().map(ChatMessage::Confirmed).collect();
            chat.unread.remove(counterpart);
        }
        self.events.publish(PortalEvent::UnreadChanged {
            sender: counterpart.to_owned(),
            count: 0,
        });
        Ok(rows)
    }

    /// Closes the open conversation, dropping its local history.
    pub fn close_conversation(&self) {
        let mut chat = self.state.lock().unwrap();
        chat.open_with = None;
        chat.conversation.clear();
    }

    /// Counterpart of the open conversation, if any.
    pub fn open_with(&self) -> Option<String> {
        self.state.lock().unwrap().open_with.clone()
    }

    /// Snapshot of the open conversation, oldest first.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        self.state.lock().unwrap().conversation.clone()
    }

    /// Sends a message to `receiver`. The message lands in the open
    /// conversation immediately: as a confirmed row when the service echoes
    /// one back, otherwise as a pending placeholder settled later by the
    /// change feed. Both participants' activity timestamps are bumped best
    /// effort.
    pub async fn send(&self, receiver: &str, text: &str) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            bail!("cannot send an empty message");
        }

        let payload = NewMessage::new(self.viewer.clone(), receiver, text);
        let stored = match self.backend.insert_message(payload).await {
            Ok(stored) => stored,
            Err(e) => {
                self.events.publish(PortalEvent::ShowNotification(
                    Notification::error("Message failed to send").with_body(e.to_string()),
                ));
                return Err(e.into());
            }
        };

        let (message, entry) = match stored {
            Some(row) => (row.clone(), ChatMessage::Confirmed(row)),
            None => {
                let placeholder = Message::new(self.viewer.clone(), receiver, text);
                (placeholder.clone(), ChatMessage::Pending(placeholder))
            }
        };

        {
            let mut chat = self.state.lock().unwrap();
            if chat.open_with.as_deref() == Some(receiver) {
                chat.conversation.push(entry);
            }
        }

        let now = Utc::now();
        for email in [self.viewer.as_str(), receiver] {
            if let Err(e) = self.backend.touch_last_active(email, now).await {
                debug!(email, error = %e, "failed to bump activity after send");
            }
        }

        self.events.publish(PortalEvent::MessageSent {
            to: receiver.to_owned(),
        });
        Ok(message)
    }

    /// Writes one message per recipient as a single batch, prefixing the
    /// importance marker when asked. Returns the recipient count.
    pub async fn broadcast(
        &self,
        recipients: &[String],
        text: &str,
        important: bool,
    ) -> Result<usize> {
        let text = text.trim();
        if text.is_empty() {
            bail!("cannot broadcast an empty message");
        }
        let body = if important {
            flag_important(text)
        } else {
            text.to_owned()
        };

        let payloads: Vec<NewMessage> = recipients
            .iter()
            .filter(|r| !r.trim().is_empty())
            .map(|r| NewMessage::new(self.viewer.clone(), r.trim(), body.clone()))
            .collect();
        if payloads.is_empty() {
            bail!("broadcast needs at least one recipient");
        }

        let count = payloads.len();
        self.backend.insert_messages(payloads).await?;
        self.events
            .publish(PortalEvent::BroadcastSent { recipients: count });
        Ok(count)
    }

    /// Marks one message read and decrements its sender's unread counter,
    /// flooring at zero.
    pub async fn mark_read(&self, message_id: &str, sender: &str) -> Result<()> {
        let ids = [message_id.to_owned()];
        self.backend.mark_read(&ids, Utc::now()).await?;

        let count = {
            let mut chat = self.state.lock().unwrap();
            if let Some(entry) = chat
                .conversation
                .iter_mut()
                .find(|m| m.row().id == message_id)
            {
                entry.row_mut().read_status = true;
            }
            match chat.unread.get_mut(sender) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    let remaining = *count;
                    if remaining == 0 {
                        chat.unread.remove(sender);
                    }
                    remaining
                }
                None => 0,
            }
        };
        self.events.publish(PortalEvent::UnreadChanged {
            sender: sender.to_owned(),
            count,
        });
        Ok(())
    }

    /// Refreshes the unread counters from the backend.
    pub async fn fetch_unread_counts(&self) -> Result<()> {
        let counts = self.backend.unread_counts(&self.viewer).await?;
        self.state.lock().unwrap().unread = counts;
        Ok(())
    }

    /// Unread count for one sender.
    pub fn unread_count(&self, sender: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .unread
            .get(sender)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of every unread counter.
    pub fn unread_counts(&self) -> HashMap<String, u32> {
        self.state.lock().unwrap().unread.clone()
    }

    pub fn total_unread(&self) -> u32 {
        self.state.lock().unwrap().unread.values().sum()
    }

    /// Every message the viewer sent or received, newest first.
    pub async fn all_messages(&self) -> Result<Vec<Message>> {
        Ok(self.backend.fetch_messages_for(&self.viewer).await?)
    }

    /// Orders an inbox roster: anyone with unread messages first, then most
    /// recent activity, profiles without a timestamp last.
    pub fn sort_inbox(users: &mut [UserProfile], unread: &HashMap<String, u32>) {
        users.sort_by(|a, b| {
            let a_unread = unread.get(&a.email).copied().unwrap_or(0) > 0;
            let b_unread = unread.get(&b.email).copied().unwrap_or(0) > 0;
            b_unread
                .cmp(&a_unread)
                .then_with(|| b.last_message_date.cmp(&a.last_message_date))
        });
    }

    /// Applies an inserted row from the change feed.
    ///
    /// The viewer's own rows only settle pending entries (the send path
    /// already appended them). Rows addressed to the viewer either join the
    /// open conversation, already marked read, or bump the sender's unread
    /// counter and raise a notification event.
    pub async fn handle_insert(&self, row: Message) {
        if row.sender_email == self.viewer {
            self.settle_echo(row);
            if let Err(e) = self.backend.touch_last_active(&self.viewer, Utc::now()).await {
                debug!(error = %e, "failed to bump activity on message echo");
            }
            return;
        }
        if row.receiver_email != self.viewer {
            return;
        }

        let open_with = self.state.lock().unwrap().open_with.clone();
        let in_open_conversation = open_with
            .as_deref()
            .is_some_and(|c| conversation_key(&self.viewer, c) == row.conversation_id);

        if in_open_conversation {
            let now = Utc::now();
            if let Err(e) = self
                .backend
                .mark_read(std::slice::from_ref(&row.id), now)
                .await
            {
                debug!(error = %e, "failed to mark incoming message read");
            }
            let mut row = row;
            row.read_status = true;
            row.read_at = Some(now);

            let mut chat = self.state.lock().unwrap();
            if chat.conversation.iter().any(|m| m.row().id == row.id) {
                return;
            }
            chat.conversation.push(ChatMessage::Confirmed(row));
            chat.conversation
                .sort_by(|a, b| a.row().created_at.cmp(&b.row().created_at));
        } else {
            let sender = row.sender_email.clone();
            let count = {
                let mut chat = self.state.lock().unwrap();
                let count = chat.unread.entry(sender.clone()).or_insert(0);
                *count += 1;
                *count
            };
            self.events.publish(PortalEvent::UnreadChanged {
                sender: sender.clone(),
                count,
            });
            self.events.publish(PortalEvent::MessageReceived {
                from: sender,
                preview: row.message_text.chars().take(PREVIEW_LEN).collect(),
            });
        }
    }

    /// Applies an updated row from the change feed (read receipts).
    pub fn handle_update(&self, row: Message) {
        let mut chat = self.state.lock().unwrap();
        if let Some(entry) = chat.conversation.iter_mut().find(|m| m.row().id == row.id) {
            *entry = ChatMessage::Confirmed(row);
        }
    }

    /// Drives the message change feed until it closes.
    pub async fn run(&self, mut feed: Subscription<MessageEvent>) {
        while let Some(event) = feed.recv().await {
            match event {
                MessageEvent::Inserted(row) => self.handle_insert(row).await,
                MessageEvent::Updated(row) => self.handle_update(row),
            }
        }
        debug!("message change feed closed");
    }

    /// Replaces the pending entry a confirmed server row settles, if one
    /// exists, then restores creation order: the server timestamp can land
    /// the row somewhere other than the placeholder's slot. Rows already
    /// present by id are left alone.
    fn settle_echo(&self, row: Message) {
        let mut chat = self.state.lock().unwrap();
        if chat.conversation.iter().any(|m| m.row().id == row.id) {
            return;
        }
        if let Some(entry) = chat.conversation.iter_mut().find(|m| m.is_settled_by(&row)) {
            *entry = ChatMessage::Confirmed(row);
            chat.conversation
                .sort_by(|a, b| a.row().created_at.cmp(&b.row().created_at));
        }
    }
}

impl std::fmt::Debug for MessagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingService")
            .field("viewer", &self.viewer)
            .finish_non_exhaustive()
    }
}
