//! Chat message domain types.
//!
//! Messages are grouped by a conversation key derived from the sorted pair
//! of participant emails, so either side can fetch the same history with one
//! equality filter. Locally a message is either pending (written but not yet
//! echoed back by the server) or confirmed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marker prefixed to broadcast text flagged as important.
pub const IMPORTANT_MARKER: &str = "[IMPORTANT]";

/// A chat message row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_email: String,
    pub receiver_email: String,
    pub message_text: String,
    /// Pure function of the unordered participant pair; see
    /// [`conversation_key`].
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    /// Set once, when the recipient marks the message read.
    pub read_status: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Builds an unread message between two participants, stamped now, with
    /// a generated id.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let sender = sender.into();
        let receiver = receiver.into();
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_key(&sender, &receiver),
            sender_email: sender,
            receiver_email: receiver,
            message_text: text.into(),
            created_at: Utc::now(),
            read_status: false,
            read_at: None,
        }
    }

    /// Whether the text carries the importance marker.
    pub fn is_important(&self) -> bool {
        strip_important(&self.message_text).0
    }

    /// The text with any importance marker removed.
    pub fn display_text(&self) -> &str {
        strip_important(&self.message_text).1
    }
}

/// Deterministic conversation key for an unordered pair of emails: sort the
/// pair, join with `_`. Invariant: `conversation_key(a, b) ==
/// conversation_key(b, a)`.
pub fn conversation_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}_{second}")
}

/// Prefixes the importance marker onto trimmed text.
pub fn flag_important(text: &str) -> String {
    format!("{IMPORTANT_MARKER} {}", text.trim())
}

/// Splits text into (was the marker present, text without the marker).
/// Marker matching is case-insensitive; leading whitespace after the marker
/// is dropped so the original text round-trips.
pub fn strip_important(text: &str) -> (bool, &str) {
    // Checked slice: a multibyte character straddling the marker length must
    // fall through, not panic.
    match text.get(..IMPORTANT_MARKER.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(IMPORTANT_MARKER) => {
            (true, text[IMPORTANT_MARKER.len()..].trim_start())
        }
        _ => (false, text),
    }
}

/// A message as held in local conversation state.
///
/// A `Pending` entry was written by this session but not yet confirmed by a
/// server row; it carries a locally generated id. Reconciliation replaces it
/// with the `Confirmed` server row when the echo arrives, so the two never
/// coexist.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    Pending(Message),
    Confirmed(Message),
}

impl ChatMessage {
    /// The underlying row, whichever state it is in.
    pub fn row(&self) -> &Message {
        match self {
            ChatMessage::Pending(m) | ChatMessage::Confirmed(m) => m,
        }
    }

    /// Mutable access to the underlying row.
    pub fn row_mut(&mut self) -> &mut Message {
        match self {
            ChatMessage::Pending(m) | ChatMessage::Confirmed(m) => m,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ChatMessage::Pending(_))
    }

    /// Whether a confirmed server row settles this pending entry: same
    /// conversation, same sender, same text. Ids differ by construction, so
    /// content is the matching rule.
    pub fn is_settled_by(&self, confirmed: &Message) -> bool {
        match self {
            ChatMessage::Pending(m) => {
                m.conversation_id == confirmed.conversation_id
                    && m.sender_email == confirmed.sender_email
                    && m.message_text == confirmed.message_text
            }
            ChatMessage::Confirmed(_) => false,
        }
    }
}
