//! Integration tests for the portal core.
//!
//! These tests drive whole sessions end to end over the in-memory backend:
//! login, the customer/admin chat round trip, broadcast, and the rule
//! editor's persistence. Each service module contains its own unit tests for
//! detailed logic testing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use adpilot::app::events::PortalEvent;
use adpilot::backend::{InMemoryBackend, NewMessage};
use adpilot::config::Settings;
use adpilot::domain::{conversation_key, strip_important, ApprovalStatus, UserProfile};
use adpilot::services::{Presence, StatusFilter};
use adpilot::storage::MemoryStore;
use adpilot::Portal;

const ADMIN: &str = "admin@adpilot.io";
const USER: &str = "customer@example.com";

fn seeded_backend() -> Arc<InMemoryBackend> {
    let backend = Arc::new(InMemoryBackend::new());
    let mut admin = UserProfile::new("admin-1", ADMIN);
    admin.is_admin = true;
    backend.add_profile(admin);
    backend.add_profile(UserProfile::new("user-1", USER));
    backend
}

fn portal(backend: Arc<InMemoryBackend>) -> Portal {
    Portal::new(backend, Arc::new(MemoryStore::new()), Settings::default())
}

// ============================================================================
// Customer/Admin Chat Round Trip
// ============================================================================

#[tokio::test]
async fn customer_message_reaches_admin_inbox() {
    let backend = seeded_backend();
    let user_portal = portal(backend.clone());
    let admin_portal = portal(backend.clone());

    let user = user_portal
        .open_user_session(Some(USER))
        .await
        .unwrap()
        .unwrap();
    let admin = admin_portal
        .open_admin_session(Some(ADMIN))
        .await
        .unwrap()
        .unwrap();

    user.send_to_support("My ACOS doubled overnight").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the admin has no conversation open, so the message counts as unread
    assert_eq!(admin.messaging().unread_count(USER), 1);
    let inbox = admin.inbox();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].email, USER);

    // opening the conversation surfaces the history and clears the counter
    let history = admin.messaging().open_conversation(USER).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message_text, "My ACOS doubled overnight");
    assert!(history[0].read_status);
    assert_eq!(admin.messaging().unread_count(USER), 0);
}

#[tokio::test]
async fn admin_reply_lands_in_the_open_customer_conversation() {
    let backend = seeded_backend();
    let user_portal = portal(backend.clone());
    let admin_portal = portal(backend.clone());

    let user = user_portal
        .open_user_session(Some(USER))
        .await
        .unwrap()
        .unwrap();
    let admin = admin_portal
        .open_admin_session(Some(ADMIN))
        .await
        .unwrap()
        .unwrap();

    admin.messaging().open_conversation(USER).await.unwrap();
    admin.messaging().send(USER, "Looking into it now").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let conversation = user.messaging().conversation();
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation[0].row().message_text, "Looking into it now");
    // delivery into the open conversation marks the row read server-side
    assert!(backend.stored_messages()[0].read_status);
}

#[tokio::test]
async fn sent_message_appears_exactly_once_after_the_echo() {
    let backend = seeded_backend();
    let user_portal = portal(backend.clone());
    let user = user_portal
        .open_user_session(Some(USER))
        .await
        .unwrap()
        .unwrap();

    user.send_to_support("hello").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let conversation = user.messaging().conversation();
    assert_eq!(conversation.len(), 1);
    assert!(!conversation[0].is_pending());
}

#[tokio::test]
async fn pending_placeholder_settles_when_the_feed_echoes() {
    let backend = seeded_backend();
    // the service acknowledges writes without echoing the stored row
    backend.suppress_inserted_rows(true);

    let user_portal = portal(backend.clone());
    let user = user_portal
        .open_user_session(Some(USER))
        .await
        .unwrap()
        .unwrap();

    user.send_to_support("hello").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let conversation = user.messaging().conversation();
    assert_eq!(conversation.len(), 1);
    assert!(!conversation[0].is_pending());
    assert_eq!(conversation[0].row().id, backend.stored_messages()[0].id);
}

#[tokio::test]
async fn conversation_key_is_shared_between_both_sides() {
    let backend = seeded_backend();
    let user_portal = portal(backend.clone());
    let user = user_portal
        .open_user_session(Some(USER))
        .await
        .unwrap()
        .unwrap();

    user.send_to_support("hi").await.unwrap();
    let stored = backend.stored_messages();
    assert_eq!(stored[0].conversation_id, conversation_key(ADMIN, USER));
    assert_eq!(stored[0].conversation_id, conversation_key(USER, ADMIN));
}

// ============================================================================
// Broadcast
// ============================================================================

#[tokio::test]
async fn broadcast_delivers_flagged_copies_to_every_recipient() {
    let backend = seeded_backend();
    backend.add_profile(UserProfile::new("user-2", "second@example.com"));

    let admin_portal = portal(backend.clone());
    let admin = admin_portal
        .open_admin_session(Some(ADMIN))
        .await
        .unwrap()
        .unwrap();

    let recipients = vec![USER.to_string(), "second@example.com".to_string()];
    let count = admin
        .messaging()
        .broadcast(&recipients, "Maintenance at 22:00 UTC", true)
        .await
        .unwrap();
    assert_eq!(count, 2);

    let rows = backend.stored_messages();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        let (important, text) = strip_important(&row.message_text);
        assert!(important);
        assert_eq!(text, "Maintenance at 22:00 UTC");
    }
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn admin_activity_drives_support_presence() {
    let backend = seeded_backend();
    let user_portal = portal(backend.clone());
    let user = user_portal
        .open_user_session(Some(USER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.support_presence(), Presence::Unknown);

    // an admin session start stamps the admin's activity timestamp
    let admin_portal = portal(backend.clone());
    let _admin = admin_portal
        .open_admin_session(Some(ADMIN))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(user.support_presence(), Presence::Online);
}

// ============================================================================
// Directory
// ============================================================================

#[tokio::test]
async fn approval_flows_from_admin_to_customer() {
    let backend = seeded_backend();
    let user_portal = portal(backend.clone());
    let admin_portal = portal(backend.clone());

    let user = user_portal
        .open_user_session(Some(USER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.profile().approval_status, ApprovalStatus::Pending);

    let admin = admin_portal
        .open_admin_session(Some(ADMIN))
        .await
        .unwrap()
        .unwrap();
    admin
        .directory()
        .set_approval_status("user-1", ApprovalStatus::Approved)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(user.profile().approval_status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn directory_filters_compose_with_live_signups() {
    let backend = seeded_backend();
    let admin_portal = portal(backend.clone());
    let admin = admin_portal
        .open_admin_session(Some(ADMIN))
        .await
        .unwrap()
        .unwrap();

    let events = admin_portal.events();
    let joined = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&joined);
    events.subscribe(move |event| {
        if let PortalEvent::UserJoined { email } = event {
            sink.lock().unwrap().push(email.clone());
        }
    });

    // a new signup arrives over the profile feed
    backend.add_profile(UserProfile::new("user-9", "newcomer@example.com"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        joined.lock().unwrap().as_slice(),
        ["newcomer@example.com"]
    );

    let directory = admin.directory();
    directory.set_status_filter(StatusFilter::Status(ApprovalStatus::Pending));
    directory.set_search("newcomer");
    let visible = directory.visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].email, "newcomer@example.com");
}

// ============================================================================
// Rule Editor Persistence
// ============================================================================

#[tokio::test]
async fn rule_edits_survive_a_reload() {
    let backend = seeded_backend();
    let local = Arc::new(MemoryStore::new());
    let portal = Portal::new(backend.clone(), local.clone(), Settings::default());

    let mut editor = portal.rule_editor().await;
    assert_eq!(editor.rules().len(), 3);

    let created = editor.create().await;
    editor.toggle_enabled(&created.id).await;

    // a fresh portal over the same local store sees the same collection
    let portal = Portal::new(backend, local, Settings::default());
    let editor = portal.rule_editor().await;
    assert_eq!(editor.rules().len(), 4);
    let reloaded = editor.rules().iter().find(|r| r.id == created.id).unwrap();
    assert!(reloaded.enabled);
}

#[tokio::test]
async fn unread_messages_waiting_at_login_are_counted() {
    let backend = seeded_backend();
    backend.inject_message(NewMessage::new(USER, ADMIN, "first"));
    backend.inject_message(NewMessage::new(USER, ADMIN, "second"));

    let admin_portal = portal(backend);
    let admin = admin_portal
        .open_admin_session(Some(ADMIN))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(admin.messaging().unread_count(USER), 2);
    assert_eq!(admin.messaging().total_unread(), 2);
}
