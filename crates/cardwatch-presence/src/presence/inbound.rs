//! Inbound throttling and duplicate suppression.
//!
//! Roster deltas and activity entries arrive in storms; both collapse to
//! the first event per window. Activity is additionally dropped when the
//! feed already holds a matching entry that is still recent. Everything
//! else is a keyed upsert or too rare to matter and passes straight
//! through.

use crate::protocol::InboundEvent;

use super::store::PresenceStore;
use super::types::InboundWindows;

#[derive(Debug, Clone, Default)]
pub struct InboundThrottle {
    windows: InboundWindows,
    last_roster_ms: Option<i64>,
    last_activity_ms: Option<i64>,
}

fn within(last: Option<i64>, now_ms: i64, window_ms: i64) -> bool {
    last.is_some_and(|t| now_ms - t < window_ms)
}

impl InboundThrottle {
    pub fn new(windows: InboundWindows) -> Self {
        Self {
            windows,
            last_roster_ms: None,
            last_activity_ms: None,
        }
    }

    /// Decide whether `event` should reach the store. Admitted roster and
    /// activity events start a new window.
    pub fn admit(&mut self, event: &InboundEvent, store: &PresenceStore, now_ms: i64) -> bool {
        match event {
            InboundEvent::UserOnline(_) | InboundEvent::UserOffline { .. } => {
                if within(self.last_roster_ms, now_ms, self.windows.roster_ms) {
                    return false;
                }
                self.last_roster_ms = Some(now_ms);
                true
            }
            InboundEvent::UserActivity(activity) => {
                if within(self.last_activity_ms, now_ms, self.windows.activity_ms) {
                    return false;
                }
                let duplicate = store.activity().iter().any(|existing| {
                    existing.same_content(activity)
                        && now_ms - existing.timestamp < self.windows.activity_dedup_ms
                });
                if duplicate {
                    return false;
                }
                self.last_activity_ms = Some(now_ms);
                true
            }
            InboundEvent::Connected { .. }
            | InboundEvent::OnlineUsers(_)
            | InboundEvent::Typing(_)
            | InboundEvent::Viewing(_)
            | InboundEvent::Editing(_)
            | InboundEvent::Notification(_)
            | InboundEvent::Alert(_)
            | InboundEvent::Error { .. }
            | InboundEvent::Unknown { .. } => true,
        }
    }

    pub fn reset(&mut self) {
        self.last_roster_ms = None;
        self.last_activity_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ActivityEvent, NotificationPayload, OnlineUser, TypingIndicator, UserProfile,
    };
    use serde_json::Value;

    fn online(id: &str) -> InboundEvent {
        InboundEvent::UserOnline(OnlineUser {
            user_id: id.into(),
            user: UserProfile::default(),
        })
    }

    fn activity(user_id: &str, resource_id: &str, ts: i64) -> InboundEvent {
        InboundEvent::UserActivity(ActivityEvent {
            user_id: user_id.into(),
            resource: "cardholder".into(),
            action: "update".into(),
            resource_id: resource_id.into(),
            details: Value::Null,
            timestamp: ts,
        })
    }

    /// Throttle then apply, the way the client does it.
    fn feed(throttle: &mut InboundThrottle, store: &mut PresenceStore, ev: InboundEvent, now: i64) {
        if throttle.admit(&ev, store, now) {
            store.apply(ev, now);
        }
    }

    #[test]
    fn roster_burst_only_first_applies() {
        let mut throttle = InboundThrottle::default();
        let mut store = PresenceStore::default();
        feed(&mut throttle, &mut store, online("a"), 0);
        let after_first = store.online_users().len();
        for (i, id) in ["b", "c", "d", "e"].iter().enumerate() {
            feed(&mut throttle, &mut store, online(id), 100 + i as i64 * 400);
        }
        assert_eq!(store.online_users().len(), after_first);
    }

    #[test]
    fn roster_window_reopens_after_2000ms() {
        let mut throttle = InboundThrottle::default();
        let store = PresenceStore::default();
        assert!(throttle.admit(&online("a"), &store, 0));
        assert!(!throttle.admit(&online("b"), &store, 1999));
        assert!(throttle.admit(&online("b"), &store, 2000));
    }

    #[test]
    fn offline_shares_roster_window() {
        let mut throttle = InboundThrottle::default();
        let store = PresenceStore::default();
        assert!(throttle.admit(&online("a"), &store, 0));
        let offline = InboundEvent::UserOffline {
            user_id: "a".into(),
        };
        assert!(!throttle.admit(&offline, &store, 500));
    }

    #[test]
    fn full_roster_is_never_throttled() {
        let mut throttle = InboundThrottle::default();
        let store = PresenceStore::default();
        assert!(throttle.admit(&online("a"), &store, 0));
        assert!(throttle.admit(&InboundEvent::OnlineUsers(Vec::new()), &store, 1));
    }

    #[test]
    fn activity_collapses_within_1000ms() {
        let mut throttle = InboundThrottle::default();
        let store = PresenceStore::default();
        assert!(throttle.admit(&activity("u1", "1", 0), &store, 0));
        assert!(!throttle.admit(&activity("u2", "2", 999), &store, 999));
        assert!(throttle.admit(&activity("u2", "2", 1000), &store, 1000));
    }

    #[test]
    fn duplicate_activity_within_5000ms_does_not_grow_feed() {
        let mut throttle = InboundThrottle::default();
        let mut store = PresenceStore::default();
        feed(&mut throttle, &mut store, activity("u1", "1", 0), 0);
        for now in [1500, 3000, 4999] {
            feed(&mut throttle, &mut store, activity("u1", "1", now), now);
        }
        assert_eq!(store.activity().len(), 1);

        // Same content, but the stored one is now old enough.
        feed(&mut throttle, &mut store, activity("u1", "1", 5000), 5000);
        assert_eq!(store.activity().len(), 2);
    }

    #[test]
    fn different_content_is_not_a_duplicate() {
        let mut throttle = InboundThrottle::default();
        let mut store = PresenceStore::default();
        feed(&mut throttle, &mut store, activity("u1", "1", 0), 0);
        feed(&mut throttle, &mut store, activity("u1", "2", 1500), 1500);
        assert_eq!(store.activity().len(), 2);
    }

    #[test]
    fn keyed_and_rare_events_always_pass() {
        let mut throttle = InboundThrottle::default();
        let store = PresenceStore::default();
        let typing = InboundEvent::Typing(TypingIndicator {
            resource: "r".into(),
            resource_id: "1".into(),
            user_id: "u".into(),
            is_typing: true,
        });
        let alert = InboundEvent::Alert(NotificationPayload {
            id: None,
            kind: None,
            title: String::new(),
            message: String::new(),
            priority: "high".into(),
            details: Value::Null,
            timestamp: None,
        });
        for now in 0..5 {
            assert!(throttle.admit(&typing, &store, now));
            assert!(throttle.admit(&alert, &store, now));
        }
    }

    #[test]
    fn reset_reopens_windows() {
        let mut throttle = InboundThrottle::default();
        let store = PresenceStore::default();
        assert!(throttle.admit(&online("a"), &store, 0));
        throttle.reset();
        assert!(throttle.admit(&online("b"), &store, 1));
    }
}
