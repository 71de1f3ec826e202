//! Service layer for the customer portal.
//!
//! Services compose the backend client, local storage, and the event bus
//! into the operations the presentation layer calls. Each service owns its
//! slice of session state; cross-cutting notifications go through
//! [`EventBus`](crate::app::events::EventBus).

pub mod directory;
pub mod identity;
pub mod messaging;
pub mod presence;
pub mod rules;

pub use directory::{DirectoryError, DirectoryService, StatusFilter};
pub use identity::{IdentityError, IdentityResolver, USER_EMAIL_KEY};
pub use messaging::MessagingService;
pub use presence::{
    merge_presence_source, presence_at, presence_now, Heartbeat, Presence,
};
pub use rules::RuleEditor;
