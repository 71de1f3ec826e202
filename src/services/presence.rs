//! Presence computation and the activity heartbeat.
//!
//! Presence is a derived view over a profile's `last_message_date`, not a
//! stored flag: "online" means the timestamp moved within the last minute,
//! which only stays true because active admin sessions stamp their own
//! timestamp on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::backend::PortalBackend;
use crate::domain::UserProfile;

/// Derived presence state for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// No activity timestamp recorded.
    Unknown,
    /// Active within the last minute.
    Online,
    /// Last active this many whole hours ago (under a day).
    HoursAgo(i64),
    /// Last active this many whole days ago.
    DaysAgo(i64),
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Presence::Unknown => write!(f, "unknown"),
            Presence::Online => write!(f, "online"),
            Presence::HoursAgo(h) => write!(f, "last active {h}h ago"),
            Presence::DaysAgo(d) => write!(f, "last active {d}d ago"),
        }
    }
}

/// Computes presence for an activity timestamp at a given instant.
///
/// Under one elapsed minute is online; at exactly one minute the label
/// switches to the "last active" form.
pub fn presence_at(last_active: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Presence {
    let Some(last_active) = last_active else {
        return Presence::Unknown;
    };

    let minutes = (now - last_active).num_minutes();
    if minutes < 1 {
        Presence::Online
    } else if minutes < 24 * 60 {
        Presence::HoursAgo(minutes / 60)
    } else {
        Presence::DaysAgo(minutes / 60 / 24)
    }
}

/// Computes presence against the current clock.
pub fn presence_now(last_active: Option<DateTime<Utc>>) -> Presence {
    presence_at(last_active, Utc::now())
}

/// Merges a profile update into the tracked presence source, keeping the
/// profile with the fresher activity timestamp. Any admin session feeds the
/// same slot; multi-admin semantics are deliberately coarse.
pub fn merge_presence_source(
    current: Option<UserProfile>,
    updated: UserProfile,
) -> UserProfile {
    match current {
        Some(current) => match (current.last_message_date, updated.last_message_date) {
            // A timestamp-less update never displaces a known-active source.
            (Some(_), None) => current,
            (Some(cur), Some(upd)) if upd < cur => current,
            _ => updated,
        },
        None => updated,
    }
}

/// Background task stamping a session's own activity timestamp so its
/// presence reads online for others. A liveness signal, not a data update:
/// write failures are logged and swallowed.
pub struct Heartbeat {
    handle: tokio::task::JoinHandle<()>,
}

impl Heartbeat {
    /// Default stamping interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    /// Starts stamping `email` every `interval` until stopped or dropped.
    pub fn start(backend: Arc<dyn PortalBackend>, email: String, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately; the
            // session start already stamped, so skip it.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = backend.touch_last_active(&email, Utc::now()).await {
                    tracing::debug!(email = %email, error = %e, "presence heartbeat write failed");
                }
            }
        });

        Self { handle }
    }

    /// Stops the heartbeat. Also happens on drop.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use chrono::Duration as ChronoDuration;

    fn at(seconds_ago: i64) -> Option<DateTime<Utc>> {
        Some(Utc::now() - ChronoDuration::seconds(seconds_ago))
    }

    #[test]
    fn no_timestamp_is_unknown() {
        assert_eq!(presence_now(None), Presence::Unknown);
    }

    #[test]
    fn under_a_minute_is_online() {
        assert_eq!(presence_now(at(0)), Presence::Online);
        assert_eq!(presence_now(at(59)), Presence::Online);
    }

    #[test]
    fn exactly_one_minute_is_not_online() {
        let now = Utc::now();
        let label = presence_at(Some(now - ChronoDuration::seconds(60)), now);
        assert_eq!(label, Presence::HoursAgo(0));
    }

    #[test]
    fn hours_bucket_under_a_day() {
        let now = Utc::now();
        assert_eq!(
            presence_at(Some(now - ChronoDuration::minutes(90)), now),
            Presence::HoursAgo(1)
        );
        assert_eq!(
            presence_at(Some(now - ChronoDuration::hours(23)), now),
            Presence::HoursAgo(23)
        );
    }

    #[test]
    fn days_bucket_from_a_day_up() {
        let now = Utc::now();
        assert_eq!(
            presence_at(Some(now - ChronoDuration::hours(24)), now),
            Presence::DaysAgo(1)
        );
        assert_eq!(
            presence_at(Some(now - ChronoDuration::days(10)), now),
            Presence::DaysAgo(10)
        );
    }

    #[test]
    fn display_labels() {
        assert_eq!(Presence::Online.to_string(), "online");
        assert_eq!(Presence::HoursAgo(3).to_string(), "last active 3h ago");
        assert_eq!(Presence::DaysAgo(2).to_string(), "last active 2d ago");
        assert_eq!(Presence::Unknown.to_string(), "unknown");
    }

    #[test]
    fn merge_keeps_fresher_source() {
        let mut older = UserProfile::new("1", "a@x.com");
        older.last_message_date = Some(Utc::now() - ChronoDuration::hours(1));
        let mut newer = UserProfile::new("2", "b@x.com");
        newer.last_message_date = Some(Utc::now());

        let merged = merge_presence_source(Some(newer.clone()), older.clone());
        assert_eq!(merged.email, "b@x.com");

        let merged = merge_presence_source(Some(older), newer.clone());
        assert_eq!(merged.email, "b@x.com");

        let merged = merge_presence_source(None, newer.clone());
        assert_eq!(merged.email, "b@x.com");
    }

    #[test]
    fn merge_ignores_timestamp_less_updates() {
        let mut active = UserProfile::new("1", "fresh@x.com");
        active.last_message_date = Some(Utc::now() - ChronoDuration::seconds(5));
        let signup = UserProfile::new("2", "stale@x.com");
        assert!(signup.last_message_date.is_none());

        // a fresh admin signup must not flip an online source to unknown
        let merged = merge_presence_source(Some(active.clone()), signup.clone());
        assert_eq!(merged.email, "fresh@x.com");

        // with no source yet, any profile is better than none
        let merged = merge_presence_source(None, signup);
        assert_eq!(merged.email, "stale@x.com");
    }

    #[tokio::test]
    async fn heartbeat_stamps_and_stops() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_profile(UserProfile::new("1", "admin@x.com"));

        let heartbeat = Heartbeat::start(
            backend.clone(),
            "admin@x.com".to_string(),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        let stamped = backend
            .stored_profile("admin@x.com")
            .unwrap()
            .last_message_date;
        assert!(stamped.is_some());

        heartbeat.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let frozen = backend
            .stored_profile("admin@x.com")
            .unwrap()
            .last_message_date;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            backend
                .stored_profile("admin@x.com")
                .unwrap()
                .last_message_date,
            frozen
        );
    }
}
