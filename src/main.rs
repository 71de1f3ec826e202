//! adpilot - offline development harness for the portal core
//!
//! Runs the portal against the in-memory backend with a seeded admin and
//! customer, exercising the login, messaging, and rule-editing paths end to
//! end. Useful for poking at the core without a hosted backend.

use std::sync::Arc;

use adpilot::backend::InMemoryBackend;
use adpilot::config::Settings;
use adpilot::domain::UserProfile;
use adpilot::storage::MemoryStore;
use adpilot::Portal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let backend = Arc::new(InMemoryBackend::new());
    let mut admin = UserProfile::new("admin-1", "admin@adpilot.io");
    admin.is_admin = true;
    backend.add_profile(admin);
    backend.add_profile(UserProfile::new("user-1", "customer@example.com"));

    let portal = Portal::new(backend, Arc::new(MemoryStore::new()), Settings::default());

    let mut editor = portal.rule_editor().await;
    tracing::info!(rules = editor.rules().len(), "loaded automation rules");
    for rule in editor.rules() {
        tracing::info!(name = %rule.name, enabled = rule.enabled, "rule");
    }
    let created = editor.create().await;
    tracing::info!(id = %created.id, "created a draft rule");

    let session = portal
        .open_user_session(Some("customer@example.com"))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no session"))?;
    tracing::info!(support = %session.support_email(), "opened user session");

    let sent = session.send_to_support("Hello, my ACOS looks off").await?;
    tracing::info!(id = %sent.id, "sent a support message");
    tracing::info!(presence = %session.support_presence(), "support presence");

    Ok(())
}
