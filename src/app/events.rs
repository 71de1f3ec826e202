//! Event bus for cross-component communication.
//!
//! Services publish portal events (new message, status change, toast
//! requests) and presentation layers subscribe. Subscribers get an id back
//! and must unsubscribe on teardown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::ApprovalStatus;

/// Domain events published by the portal services.
#[derive(Debug, Clone)]
pub enum PortalEvent {
    /// A message arrived for the viewer outside the open conversation.
    MessageReceived { from: String, preview: String },
    /// The viewer's own message was written.
    MessageSent { to: String },
    /// An unread counter changed.
    UnreadChanged { sender: String, count: u32 },
    /// A profile's approval status changed.
    ApprovalStatusChanged {
        email: String,
        status: ApprovalStatus,
    },
    /// A new user profile appeared.
    UserJoined { email: String },
    /// A broadcast batch was written.
    BroadcastSent { recipients: usize },
    /// Show a user-visible notification.
    ShowNotification(Notification),
}

/// A user notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: Option<String>,
    pub level: NotificationLevel,
}

/// Notification severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationLevel {
    #[default]
    Info,
    Success,
    Error,
}

impl Notification {
    pub fn info(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: None,
            level: NotificationLevel::Info,
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: None,
            level: NotificationLevel::Success,
        }
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: None,
            level: NotificationLevel::Error,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Subscriber ID for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Event handler function type.
pub type EventHandler = Box<dyn Fn(&PortalEvent) + Send + Sync>;

/// Event bus for publish-subscribe communication.
///
/// Thread-safe for use across async boundaries; cloning shares the
/// subscriber set.
pub struct EventBus {
    handlers: Arc<Mutex<HashMap<u64, EventHandler>>>,
    next_id: Arc<Mutex<u64>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(0)),
        }
    }

    /// Subscribes to all events. Returns an id for unsubscribing.
    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&PortalEvent) + Send + Sync + 'static,
    {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;

        let mut handlers = self.handlers.lock().unwrap();
        handlers.insert(id, Box::new(handler));

        SubscriberId(id)
    }

    /// Removes a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        let mut handlers = self.handlers.lock().unwrap();
        handlers.remove(&subscriber_id.0);
    }

    /// Publishes an event to every subscriber.
    pub fn publish(&self, event: PortalEvent) {
        let handlers = self.handlers.lock().unwrap();
        for handler in handlers.values() {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}
