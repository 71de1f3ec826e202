//! Session identity resolution.
//!
//! The portal can learn who is signed in from three places: an explicit hint
//! (a login form, a deep link), the locally remembered email, or the hosted
//! session. [`IdentityResolver`] applies that precedence and keeps the local
//! copy in sync with whichever source won.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::PortalBackend;
use crate::storage::KeyValueStore;

/// Local storage key holding the remembered session email.
pub const USER_EMAIL_KEY: &str = "user_email";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),
}

/// Resolves and remembers the signed-in email.
pub struct IdentityResolver {
    backend: Arc<dyn PortalBackend>,
    local: Arc<dyn KeyValueStore>,
}

impl IdentityResolver {
    pub fn new(backend: Arc<dyn PortalBackend>, local: Arc<dyn KeyValueStore>) -> Self {
        Self { backend, local }
    }

    /// Resolves the session email: an explicit hint wins, then the locally
    /// remembered value, then the hosted session. The winner is persisted
    /// locally; `None` means nobody is signed in.
    pub async fn resolve(&self, hint: Option<&str>) -> Result<Option<String>> {
        if let Some(hint) = hint {
            let email = normalize(hint)?;
            self.remember(&email).await;
            return Ok(Some(email));
        }

        match self.local.get(USER_EMAIL_KEY).await {
            Ok(Some(saved)) if !saved.trim().is_empty() => {
                return Ok(Some(saved.trim().to_owned()));
            }
            Ok(_) => {}
            Err(e) => {
                // Treat an unreadable local store as an absent value.
                warn!(error = %e, "failed to read remembered session email");
            }
        }

        match self.backend.session_email().await? {
            Some(email) => {
                self.remember(&email).await;
                Ok(Some(email))
            }
            None => Ok(None),
        }
    }

    /// Clears the session everywhere. Both halves are best effort: the local
    /// copy is cleared even when the hosted sign-out fails, so a retried
    /// login starts clean.
    pub async fn sign_out(&self) {
        if let Err(e) = self.local.remove(USER_EMAIL_KEY).await {
            warn!(error = %e, "failed to clear remembered session email");
        }
        if let Err(e) = self.backend.sign_out().await {
            warn!(error = %e, "hosted sign-out failed");
        }
    }

    async fn remember(&self, email: &str) {
        if let Err(e) = self.local.set(USER_EMAIL_KEY, email).await {
            debug!(error = %e, "failed to remember session email");
        }
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

/// Rejects obviously malformed addresses before any network call.
fn normalize(raw: &str) -> Result<String, IdentityError> {
    let email = raw.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local_part, domain)| !local_part.is_empty() && !domain.is_empty())
        && !email.contains(char::is_whitespace);
    if well_formed {
        Ok(email.to_owned())
    } else {
        Err(IdentityError::InvalidEmail(raw.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::storage::MemoryStore;

    fn resolver() -> (Arc<InMemoryBackend>, Arc<MemoryStore>, IdentityResolver) {
        let backend = Arc::new(InMemoryBackend::new());
        let local = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(backend.clone(), local.clone());
        (backend, local, resolver)
    }

    #[tokio::test]
    async fn hint_wins_and_is_remembered() {
        let (_, local, resolver) = resolver();
        local.set(USER_EMAIL_KEY, "stale@x.com").await.unwrap();

        let email = resolver.resolve(Some("fresh@x.com")).await.unwrap();
        assert_eq!(email.as_deref(), Some("fresh@x.com"));
        assert_eq!(
            local.get(USER_EMAIL_KEY).await.unwrap().as_deref(),
            Some("fresh@x.com")
        );
    }

    #[tokio::test]
    async fn remembered_email_beats_backend_session() {
        let (backend, local, resolver) = resolver();
        backend.set_session("session@x.com");
        local.set(USER_EMAIL_KEY, "saved@x.com").await.unwrap();

        let email = resolver.resolve(None).await.unwrap();
        assert_eq!(email.as_deref(), Some("saved@x.com"));
    }

    #[tokio::test]
    async fn backend_session_is_remembered() {
        let (backend, local, resolver) = resolver();
        backend.set_session("session@x.com");

        let email = resolver.resolve(None).await.unwrap();
        assert_eq!(email.as_deref(), Some("session@x.com"));
        assert_eq!(
            local.get(USER_EMAIL_KEY).await.unwrap().as_deref(),
            Some("session@x.com")
        );
    }

    #[tokio::test]
    async fn nobody_signed_in() {
        let (_, _, resolver) = resolver();
        assert_eq!(resolver.resolve(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_hint_rejected_before_network() {
        let (_, local, resolver) = resolver();
        for bad in ["not-an-email", "@x.com", "user@", "two words@x.com", ""] {
            let err = resolver.resolve(Some(bad)).await.unwrap_err();
            assert!(err.downcast_ref::<IdentityError>().is_some(), "{bad:?}");
        }
        assert_eq!(local.get(USER_EMAIL_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_clears_local_copy() {
        let (backend, local, resolver) = resolver();
        backend.set_session("user@x.com");
        local.set(USER_EMAIL_KEY, "user@x.com").await.unwrap();

        resolver.sign_out().await;
        assert_eq!(local.get(USER_EMAIL_KEY).await.unwrap(), None);
        assert_eq!(resolver.resolve(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_clears_local_even_when_backend_fails() {
        let (backend, local, resolver) = resolver();
        backend.set_session("user@x.com");
        local.set(USER_EMAIL_KEY, "user@x.com").await.unwrap();

        backend.fail_next_write();
        resolver.sign_out().await;
        assert_eq!(local.get(USER_EMAIL_KEY).await.unwrap(), None);
    }
}
