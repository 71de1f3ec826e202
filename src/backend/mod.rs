//! Hosted backend client contract.
//!
//! The portal consumes exactly three capabilities from its hosted data
//! service: row storage, change-feed subscriptions, and session identity.
//! [`PortalBackend`] captures that surface; [`InMemoryBackend`] is the
//! reference implementation used by tests and offline development.

mod memory;
mod traits;
mod types;

pub use memory::InMemoryBackend;
pub use traits::PortalBackend;
pub use types::{
    BackendError, MessageEvent, NewMessage, ProfileEvent, Result, Subscription, SubscriptionGuard,
};
