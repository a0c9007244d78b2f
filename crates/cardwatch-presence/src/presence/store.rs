//! In-memory presence state.
//!
//! One mutation per inbound event, applied atomically. Collections are
//! only ever appended to, filtered, or keyed-replaced; no entry is edited
//! in place.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::protocol::{ActivityEvent, InboundEvent, OnlineUser, PresenceIndicator};

use super::types::{IndicatorEntry, Notification, ResourceKey, TypingKey};

#[derive(Debug, Clone)]
pub struct PresenceStore {
    connected: bool,
    online: HashMap<String, OnlineUser>,
    /// Newest first.
    activity: VecDeque<ActivityEvent>,
    typing: HashSet<TypingKey>,
    viewing: HashMap<ResourceKey, Vec<IndicatorEntry>>,
    editing: HashMap<ResourceKey, Vec<IndicatorEntry>>,
    /// Newest first.
    notifications: VecDeque<Notification>,
    activity_capacity: usize,
    notification_capacity: usize,
}

impl Default for PresenceStore {
    fn default() -> Self {
        Self::new(50, 100)
    }
}

impl PresenceStore {
    pub fn new(activity_capacity: usize, notification_capacity: usize) -> Self {
        Self {
            connected: false,
            online: HashMap::new(),
            activity: VecDeque::with_capacity(activity_capacity),
            typing: HashSet::new(),
            viewing: HashMap::new(),
            editing: HashMap::new(),
            notifications: VecDeque::new(),
            activity_capacity,
            notification_capacity,
        }
    }

    /// Apply one server event. Returns whether anything changed.
    ///
    /// `now_ms` stamps viewing/editing entries and notifications without a
    /// timestamp.
    pub fn apply(&mut self, event: InboundEvent, now_ms: i64) -> bool {
        match event {
            InboundEvent::OnlineUsers(users) => {
                self.online = users
                    .into_iter()
                    .map(|u| (u.user_id.clone(), u))
                    .collect();
                true
            }
            InboundEvent::UserOnline(user) => {
                self.online.insert(user.user_id.clone(), user);
                true
            }
            InboundEvent::UserOffline { user_id } => self.online.remove(&user_id).is_some(),
            InboundEvent::UserActivity(activity) => {
                self.push_activity(activity);
                true
            }
            InboundEvent::Typing(ind) => {
                let key = TypingKey {
                    resource: ResourceKey::new(ind.resource, ind.resource_id),
                    user_id: ind.user_id,
                };
                if ind.is_typing {
                    self.typing.insert(key)
                } else {
                    self.typing.remove(&key)
                }
            }
            InboundEvent::Viewing(ind) => {
                upsert_indicator(&mut self.viewing, ind, now_ms);
                true
            }
            InboundEvent::Editing(ind) => {
                if ind.is_editing == Some(false) {
                    let key = ResourceKey::new(ind.resource, ind.resource_id);
                    remove_indicator(&mut self.editing, &key, &ind.user_id)
                } else {
                    upsert_indicator(&mut self.editing, ind, now_ms);
                    true
                }
            }
            InboundEvent::Notification(payload) => {
                self.push_notification(Notification::from_payload(payload, "notification", now_ms));
                true
            }
            InboundEvent::Alert(payload) => {
                self.push_notification(Notification::from_payload(payload, "alert", now_ms));
                true
            }
            InboundEvent::Connected { .. }
            | InboundEvent::Error { .. }
            | InboundEvent::Unknown { .. } => false,
        }
    }

    fn push_activity(&mut self, activity: ActivityEvent) {
        self.activity.push_front(activity);
        self.activity.truncate(self.activity_capacity);
    }

    pub fn push_notification(&mut self, notification: Notification) {
        self.notifications.push_front(notification);
        self.notifications.truncate(self.notification_capacity);
    }

    pub fn clear_notifications(&mut self) -> bool {
        let had = !self.notifications.is_empty();
        self.notifications.clear();
        had
    }

    pub fn set_connected(&mut self, connected: bool) -> bool {
        std::mem::replace(&mut self.connected, connected) != connected
    }

    /// Drop all presence state. Only an explicit disconnect does this.
    pub fn reset(&mut self) {
        self.connected = false;
        self.online.clear();
        self.activity.clear();
        self.typing.clear();
        self.viewing.clear();
        self.editing.clear();
        self.notifications.clear();
    }

    /// Nothing but the capacities is left.
    pub fn is_empty(&self) -> bool {
        !self.connected
            && self.online.is_empty()
            && self.activity.is_empty()
            && self.typing.is_empty()
            && self.viewing.is_empty()
            && self.editing.is_empty()
            && self.notifications.is_empty()
    }

    // -- reads ---------------------------------------------------------------

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Roster sorted by user id.
    pub fn online_users(&self) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self.online.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains_key(user_id)
    }

    pub fn activity(&self) -> &VecDeque<ActivityEvent> {
        &self.activity
    }

    pub fn notifications(&self) -> &VecDeque<Notification> {
        &self.notifications
    }

    /// Users currently typing on a resource, sorted.
    pub fn typing_users(&self, key: &ResourceKey) -> Vec<String> {
        let mut users: Vec<String> = self
            .typing
            .iter()
            .filter(|t| &t.resource == key)
            .map(|t| t.user_id.clone())
            .collect();
        users.sort();
        users
    }

    /// Raw viewing entries, stale ones included.
    pub fn viewing_entries(&self, key: &ResourceKey) -> &[IndicatorEntry] {
        self.viewing.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Raw editing entries, stale ones included.
    pub fn editing_entries(&self, key: &ResourceKey) -> &[IndicatorEntry] {
        self.editing.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Remove any entry for the user, then insert the fresh one.
fn upsert_indicator(
    map: &mut HashMap<ResourceKey, Vec<IndicatorEntry>>,
    ind: PresenceIndicator,
    now_ms: i64,
) {
    let key = ResourceKey::new(ind.resource, ind.resource_id);
    let entries = map.entry(key).or_default();
    entries.retain(|e| e.user_id != ind.user_id);
    entries.push(IndicatorEntry {
        user_id: ind.user_id,
        extra: ind.extra,
        received_at: Some(now_ms),
    });
}

fn remove_indicator(
    map: &mut HashMap<ResourceKey, Vec<IndicatorEntry>>,
    key: &ResourceKey,
    user_id: &str,
) -> bool {
    let Some(entries) = map.get_mut(key) else {
        return false;
    };
    let before = entries.len();
    entries.retain(|e| e.user_id != user_id);
    let changed = entries.len() != before;
    if entries.is_empty() {
        map.remove(key);
    }
    changed
}

// =============================================================================
// Tests
// =============================================================================
