//! Presence client: owns the connection, folds server events into the
//! store, and hands out cheap handles to consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::identity::AuthSession;
use crate::protocol::{module_room, ActivityEvent, Envelope, InboundEvent, OnlineUser};
use crate::realtime::{ConnectionState, RealtimeClient, RealtimeEvent, RealtimeEventKind};

use super::inbound::InboundThrottle;
use super::outbound::{ActivityEmitter, OutboundSink};
use super::reaper::StalenessReaper;
use super::store::PresenceStore;
use super::types::{IndicatorEntry, Notification, PresenceConfig, ResourceKey};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Inner {
    store: PresenceStore,
    inbound: InboundThrottle,
    session: Option<AuthSession>,
    /// User id the server resolved our token to.
    confirmed_user_id: Option<String>,
    /// Holders per room. Outlives disconnects; mounted pages keep their rooms.
    rooms: HashMap<String, usize>,
}

struct Shared {
    config: PresenceConfig,
    clock: Arc<dyn Clock>,
    realtime: RealtimeClient,
    emitter: ActivityEmitter,
    reaper: StalenessReaper,
    state: Mutex<Inner>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    fn connect(&self, session: AuthSession) -> bool {
        let token = session.token.clone();
        self.lock().session = Some(session);
        self.emitter.set_authenticated(true);
        self.realtime.connect(&token)
    }

    /// Explicit disconnect. The only path that clears presence state.
    fn disconnect(&self) {
        let mut inner = self.lock();
        // Under the lock so the dispatcher cannot apply a stale event after
        // the reset below.
        let was_active = self.realtime.disconnect();
        self.emitter.set_authenticated(false);
        self.emitter.reset();
        inner.store.reset();
        inner.inbound.reset();
        inner.session = None;
        inner.confirmed_user_id = None;
        drop(inner);
        if was_active {
            info!("Presence session ended");
        }
        self.bump();
    }

    /// Count one more holder of `room`; the first one joins.
    fn acquire_room(&self, room: &str) -> bool {
        let mut inner = self.lock();
        let holders = inner.rooms.entry(room.to_string()).or_insert(0);
        *holders += 1;
        if *holders > 1 {
            trace!(room, holders = *holders, "room already joined");
            return false;
        }
        self.emitter.join_room(room)
    }

    /// Count one holder of `room` fewer; the last one leaves.
    fn release_room(&self, room: &str) -> bool {
        let mut inner = self.lock();
        match inner.rooms.get_mut(room) {
            Some(holders) if *holders > 1 => {
                *holders -= 1;
                trace!(room, holders = *holders, "room still held");
                false
            }
            Some(_) => {
                inner.rooms.remove(room);
                self.emitter.leave_room(room)
            }
            None => false,
        }
    }

    fn handle_realtime(&self, event: RealtimeEvent) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        if !self.realtime.is_current(event.generation) {
            trace!(generation = event.generation, "dropping event from a closed session");
            return;
        }

        let mut request_roster = false;
        let changed = match event.kind {
            RealtimeEventKind::Connected { user_id } => {
                if user_id.is_some() {
                    inner.confirmed_user_id = user_id;
                }
                request_roster = true;
                inner.store.set_connected(true)
            }
            RealtimeEventKind::Message(envelope) => {
                let (changed, roster) = apply_envelope(&mut inner, envelope, now);
                request_roster = roster;
                changed
            }
            RealtimeEventKind::Dropped { reason } => {
                debug!(reason = %reason, "presence offline, keeping state for reconnect");
                inner.store.set_connected(false)
            }
            RealtimeEventKind::Rejected { reason } => {
                warn!(reason = %reason, "presence token rejected");
                inner.store.set_connected(false)
            }
            RealtimeEventKind::GaveUp => inner.store.set_connected(false),
        };
        drop(inner);

        if request_roster {
            self.emitter.request_online_users();
        }
        if changed {
            self.bump();
        }
    }
}

/// Decode, throttle and apply one server frame. Returns
/// `(state changed, roster refresh wanted)`.
fn apply_envelope(inner: &mut Inner, envelope: Envelope, now_ms: i64) -> (bool, bool) {
    let event = match InboundEvent::decode(envelope, now_ms) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Dropping malformed presence event");
            return (false, false);
        }
    };

    match &event {
        InboundEvent::Connected { user_id } => {
            if let Some(id) = user_id {
                inner.confirmed_user_id = Some(id.clone());
            }
            return (false, true);
        }
        InboundEvent::Error { message } => {
            warn!(message = %message, "Presence server reported an error");
            return (false, false);
        }
        InboundEvent::Unknown { event } => {
            debug!(event = %event, "Unhandled presence event");
            return (false, false);
        }
        _ => {}
    }

    let Inner { store, inbound, .. } = inner;
    if !inbound.admit(&event, store, now_ms) {
        trace!(event = event.name(), "inbound event throttled");
        return (false, false);
    }
    (store.apply(event, now_ms), false)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Owns the one presence connection for a session.
///
/// Construct it at the application root, call [`PresenceClient::init`]
/// with the auth state to follow, and pass [`PresenceHandle`]s to
/// whatever needs presence.
pub struct PresenceClient {
    shared: Arc<Shared>,
    events: Option<mpsc::UnboundedReceiver<RealtimeEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PresenceClient {
    pub fn new(config: PresenceConfig, clock: Arc<dyn Clock>) -> Self {
        let (realtime, events) = RealtimeClient::new(config.transport.clone(), config.backoff);
        let sink: Arc<dyn OutboundSink> = Arc::new(realtime.clone());
        let emitter = ActivityEmitter::new(sink, Arc::clone(&clock), config.outbound);
        let (revision, _) = watch::channel(0);

        let shared = Shared {
            reaper: StalenessReaper::new(config.viewing_ttl_ms, config.editing_ttl_ms),
            state: Mutex::new(Inner {
                store: PresenceStore::new(config.activity_capacity, config.notification_capacity),
                inbound: InboundThrottle::new(config.inbound),
                session: None,
                confirmed_user_id: None,
                rooms: HashMap::new(),
            }),
            config,
            clock,
            realtime,
            emitter,
            revision,
        };

        Self {
            shared: Arc::new(shared),
            events: Some(events),
            tasks: Vec::new(),
        }
    }

    pub fn handle(&self) -> PresenceHandle {
        PresenceHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start processing server events and follow `auth`: a session
    /// appearing connects, a session disappearing disconnects.
    ///
    /// Must be called from within a tokio runtime. Later calls are ignored.
    pub fn init(&mut self, auth: watch::Receiver<Option<AuthSession>>) {
        let Some(events) = self.events.take() else {
            warn!("PresenceClient::init called twice");
            return;
        };
        self.tasks
            .push(tokio::spawn(dispatch_events(Arc::clone(&self.shared), events)));
        self.tasks
            .push(tokio::spawn(follow_auth(Arc::clone(&self.shared), auth)));
    }

    /// Stop following auth, close the socket, and clear all state.
    pub async fn dispose(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.shared.realtime.shutdown().await;
        self.shared.disconnect();
    }
}

impl Drop for PresenceClient {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.shared.realtime.disconnect();
    }
}

async fn dispatch_events(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<RealtimeEvent>) {
    while let Some(event) = events.recv().await {
        shared.handle_realtime(event);
    }
}

async fn follow_auth(shared: Arc<Shared>, mut auth: watch::Receiver<Option<AuthSession>>) {
    let mut present = false;
    loop {
        let session = auth.borrow_and_update().clone();
        match (present, session) {
            (false, Some(session)) => {
                info!(user = ?session.user_id(), "Auth session present, connecting presence");
                shared.connect(session);
                present = true;
            }
            (true, None) => {
                info!("Auth session gone, disconnecting presence");
                shared.disconnect();
                present = false;
            }
            _ => {}
        }
        if auth.changed().await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Point-in-time copy of the consumer-visible state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub connected: bool,
    pub online_users: Vec<OnlineUser>,
    pub activity: Vec<ActivityEvent>,
    pub notifications: Vec<Notification>,
}

/// Consumer surface. Clones share the same client; safe to hold from
/// any number of components at once.
#[derive(Clone)]
pub struct PresenceHandle {
    shared: Arc<Shared>,
}

impl PresenceHandle {
    // -- connection ----------------------------------------------------------

    /// Connect with an explicit session. No-op if already connected or
    /// connecting.
    pub fn connect(&self, session: AuthSession) -> bool {
        self.shared.connect(session)
    }

    /// Disconnect and clear all presence state. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().store.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.realtime.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.realtime.subscribe_state()
    }

    /// Changes whenever presence state changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub fn current_user_id(&self) -> Option<String> {
        let inner = self.shared.lock();
        inner.confirmed_user_id.clone().or_else(|| {
            inner
                .session
                .as_ref()
                .and_then(|s| s.user_id().map(str::to_string))
        })
    }

    // -- reads ---------------------------------------------------------------

    pub fn snapshot(&self) -> PresenceSnapshot {
        let inner = self.shared.lock();
        PresenceSnapshot {
            connected: inner.store.is_connected(),
            online_users: inner.store.online_users(),
            activity: inner.store.activity().iter().cloned().collect(),
            notifications: inner.store.notifications().iter().cloned().collect(),
        }
    }

    pub fn online_users(&self) -> Vec<OnlineUser> {
        self.shared.lock().store.online_users()
    }

    /// Newest first.
    pub fn activity_feed(&self) -> Vec<ActivityEvent> {
        self.shared.lock().store.activity().iter().cloned().collect()
    }

    /// Newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.shared
            .lock()
            .store
            .notifications()
            .iter()
            .cloned()
            .collect()
    }

    pub fn typing_users(&self, resource: &str, resource_id: &str) -> Vec<String> {
        self.shared
            .lock()
            .store
            .typing_users(&ResourceKey::new(resource, resource_id))
    }

    /// Viewers seen within the viewing TTL, this user included.
    pub fn viewing_users(&self, resource: &str, resource_id: &str) -> Vec<IndicatorEntry> {
        let now = self.shared.clock.now_ms();
        let key = ResourceKey::new(resource, resource_id);
        self.shared
            .reaper
            .viewing_users(&self.shared.lock().store, &key, now)
    }

    /// Editors seen within the editing TTL, this user included.
    pub fn editing_users(&self, resource: &str, resource_id: &str) -> Vec<IndicatorEntry> {
        let now = self.shared.clock.now_ms();
        let key = ResourceKey::new(resource, resource_id);
        self.shared
            .reaper
            .editing_users(&self.shared.lock().store, &key, now)
    }

    fn without_self(&self, mut entries: Vec<IndicatorEntry>) -> Vec<IndicatorEntry> {
        if let Some(me) = self.current_user_id() {
            entries.retain(|e| e.user_id != me);
        }
        entries
    }

    pub fn other_viewers(&self, resource: &str, resource_id: &str) -> Vec<IndicatorEntry> {
        self.without_self(self.viewing_users(resource, resource_id))
    }

    pub fn other_editors(&self, resource: &str, resource_id: &str) -> Vec<IndicatorEntry> {
        self.without_self(self.editing_users(resource, resource_id))
    }

    // -- outbound ------------------------------------------------------------

    pub fn track_activity(
        &self,
        resource: &str,
        action: &str,
        resource_id: &str,
        details: Value,
    ) -> bool {
        self.shared
            .emitter
            .track_activity(resource, action, resource_id, details)
    }

    pub fn track_viewing(&self, resource: &str, resource_id: &str) -> bool {
        self.shared.emitter.track_viewing(resource, resource_id)
    }

    pub fn start_typing(&self, resource: &str, resource_id: &str) -> bool {
        self.shared.emitter.start_typing(resource, resource_id)
    }

    pub fn stop_typing(&self, resource: &str, resource_id: &str) -> bool {
        self.shared.emitter.stop_typing(resource, resource_id)
    }

    pub fn start_editing(&self, resource: &str, resource_id: &str) -> bool {
        self.shared.emitter.start_editing(resource, resource_id)
    }

    pub fn stop_editing(&self, resource: &str, resource_id: &str) -> bool {
        self.shared.emitter.stop_editing(resource, resource_id)
    }

    /// Hold `room`. Membership is counted: the server only sees the first
    /// join and the matching last leave, and the room is re-joined after
    /// every reconnect while held. Returns whether a frame was queued.
    pub fn join_room(&self, room: &str) -> bool {
        self.shared.acquire_room(room)
    }

    /// Release one hold on `room`. Applies even while offline.
    pub fn leave_room(&self, room: &str) -> bool {
        self.shared.release_room(room)
    }

    // -- notifications -------------------------------------------------------

    /// Add a locally-synthesized notice to the notification feed.
    pub fn add_notification(&self, title: &str, message: &str, priority: &str) {
        let notification = Notification::local(title, message, priority, self.shared.clock.now_ms());
        self.shared.lock().store.push_notification(notification);
        self.shared.bump();
    }

    pub fn clear_notifications(&self) {
        let cleared = self.shared.lock().store.clear_notifications();
        if cleared {
            self.shared.bump();
        }
    }

    // -- resource pages ------------------------------------------------------

    /// Announce that this user is looking at a resource for as long as the
    /// returned guard lives. Must be called from within a tokio runtime.
    pub fn watch_resource(&self, resource: &str, resource_id: &str) -> ResourceWatch {
        ResourceWatch::new(self.clone(), ResourceKey::new(resource, resource_id))
    }
}

// ---------------------------------------------------------------------------
// Resource watch
// ---------------------------------------------------------------------------

const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// A mounted detail page.
///
/// Holds the resource's module room, sends `viewing`, and refreshes it on
/// the heartbeat interval (and whenever the connection comes back). On
/// drop the heartbeat stops, a pending edit is closed with a best-effort
/// `editing_stop`, and the hold on the room is released; the room is left
/// once no other mounted page of the same resource type holds it.
pub struct ResourceWatch {
    handle: PresenceHandle,
    key: ResourceKey,
    room: String,
    editing: AtomicBool,
    heartbeat: JoinHandle<()>,
}

impl ResourceWatch {
    fn new(handle: PresenceHandle, key: ResourceKey) -> Self {
        let room = module_room(&key.resource);
        handle.join_room(&room);
        handle.track_viewing(&key.resource, &key.resource_id);

        let period = handle.shared.config.heartbeat_interval.max(MIN_HEARTBEAT);
        let heartbeat = tokio::spawn(heartbeat(handle.clone(), key.clone(), period));

        Self {
            handle,
            key,
            room,
            editing: AtomicBool::new(false),
            heartbeat,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn is_editing(&self) -> bool {
        self.editing.load(Ordering::SeqCst)
    }

    pub fn start_editing(&self) -> bool {
        self.editing.store(true, Ordering::SeqCst);
        self.handle
            .start_editing(&self.key.resource, &self.key.resource_id)
    }

    pub fn stop_editing(&self) -> bool {
        self.editing.store(false, Ordering::SeqCst);
        self.handle
            .stop_editing(&self.key.resource, &self.key.resource_id)
    }

    pub fn start_typing(&self) -> bool {
        self.handle
            .start_typing(&self.key.resource, &self.key.resource_id)
    }

    pub fn stop_typing(&self) -> bool {
        self.handle
            .stop_typing(&self.key.resource, &self.key.resource_id)
    }

    pub fn other_viewers(&self) -> Vec<IndicatorEntry> {
        self.handle
            .other_viewers(&self.key.resource, &self.key.resource_id)
    }

    pub fn other_editors(&self) -> Vec<IndicatorEntry> {
        self.handle
            .other_editors(&self.key.resource, &self.key.resource_id)
    }

    pub fn typing_users(&self) -> Vec<String> {
        self.handle
            .typing_users(&self.key.resource, &self.key.resource_id)
    }
}

impl Drop for ResourceWatch {
    fn drop(&mut self) {
        self.heartbeat.abort();
        if self.editing.swap(false, Ordering::SeqCst) {
            self.handle
                .stop_editing(&self.key.resource, &self.key.resource_id);
        }
        self.handle.leave_room(&self.room);
    }
}

async fn heartbeat(handle: PresenceHandle, key: ResourceKey, period: Duration) {
    let mut state = handle.subscribe_state();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                handle.track_viewing(&key.resource, &key.resource_id);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
                // Rooms are re-joined by the connection itself.
                let connected = state.borrow_and_update().is_connected();
                if connected {
                    handle.track_viewing(&key.resource, &key.resource_id);
                }
            }
        }
    }
}
