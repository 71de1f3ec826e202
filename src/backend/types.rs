//! Wire types for the hosted backend contract.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{conversation_key, Message, UserProfile};

/// Errors from the hosted backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Transport-level failure (timeout, connection refused).
    #[error("network error: {0}")]
    Network(String),

    /// The service rejected or failed the request.
    #[error("service error: {0}")]
    Service(String),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Insert payload for a message row. The server assigns the id, creation
/// timestamp, and read flags.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_email: String,
    pub receiver_email: String,
    pub message_text: String,
    pub conversation_id: String,
}

impl NewMessage {
    /// Builds a payload with the conversation id derived from the
    /// participant pair.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let sender = sender.into();
        let receiver = receiver.into();
        Self {
            conversation_id: conversation_key(&sender, &receiver),
            sender_email: sender,
            receiver_email: receiver,
            message_text: text.into(),
        }
    }
}

/// Change-feed event for the messages table.
#[derive(Debug, Clone)]
pub enum MessageEvent {
    Inserted(Message),
    Updated(Message),
}

/// Change-feed event for the profiles table.
#[derive(Debug, Clone)]
pub enum ProfileEvent {
    Inserted(UserProfile),
    Updated(UserProfile),
}

/// A live change-feed subscription.
///
/// Events arrive on an unbounded channel; dropping the subscription
/// unsubscribes from the feed, so callers tearing down a view stop
/// receiving events without further ceremony.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    _guard: SubscriptionGuard,
}

impl<T> Subscription<T> {
    pub fn new(receiver: mpsc::UnboundedReceiver<T>, guard: SubscriptionGuard) -> Self {
        Self {
            receiver,
            _guard: guard,
        }
    }

    /// Waits for the next event. Returns `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Non-blocking receive for drain loops and tests.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Runs its teardown closure when dropped.
pub struct SubscriptionGuard {
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    pub fn new(on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// A guard with no teardown, for backends without server-side state.
    pub fn noop() -> Self {
        Self { on_drop: None }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn new_message_derives_conversation_id() {
        let payload = NewMessage::new("b@x.com", "a@x.com", "hi");
        assert_eq!(payload.conversation_id, "a@x.com_b@x.com");
    }

    #[tokio::test]
    async fn try_recv_drains_without_blocking() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new(rx, SubscriptionGuard::noop());

        assert_eq!(sub.try_recv(), None);
        tx.send(7u32).unwrap();
        tx.send(8u32).unwrap();
        assert_eq!(sub.try_recv(), Some(7));
        assert_eq!(sub.try_recv(), Some(8));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn dropping_subscription_runs_guard() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dropped);

        let (tx, rx) = mpsc::unbounded_channel::<u32>();
        let sub = Subscription::new(rx, SubscriptionGuard::new(move || {
            flag.store(true, Ordering::SeqCst);
        }));

        tx.send(1).unwrap();
        drop(sub);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
