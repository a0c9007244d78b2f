//! Client-initiated presence events and their throttling.
//!
//! Every action silently does nothing unless a user is signed in and the
//! socket is connected. Start-type actions are throttled; stop signals
//! never are. Room membership bypasses both: the sink keeps the set of
//! joined rooms itself, so a join or leave made offline still decides
//! what the next session joins.
//!
//! By default activity, viewing, typing-start and editing-start all gate
//! on one shared "last emitted" timestamp, each with its own window. A
//! burst of activity therefore also holds back viewing heartbeats. Set
//! `OutboundWindows::independent` to give every action its own timestamp.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::trace;

use crate::clock::Clock;
use crate::protocol::{ActivityUpdate, OutboundEvent, ResourceRef};
use crate::realtime::RealtimeClient;

use super::types::OutboundWindows;

/// Where outbound events go. Implemented by the realtime client.
pub trait OutboundSink: Send + Sync {
    fn is_connected(&self) -> bool;
    /// Queue an event. `false` if it could not be queued.
    fn send(&self, event: OutboundEvent) -> bool;
    /// Record the room for every future session and queue the join.
    fn join_room(&self, room: &str) -> bool;
    /// Forget the room and queue the leave.
    fn leave_room(&self, room: &str) -> bool;
}

impl OutboundSink for RealtimeClient {
    fn is_connected(&self) -> bool {
        RealtimeClient::is_connected(self)
    }

    fn send(&self, event: OutboundEvent) -> bool {
        RealtimeClient::send(self, event)
    }

    fn join_room(&self, room: &str) -> bool {
        RealtimeClient::join_room(self, room)
    }

    fn leave_room(&self, room: &str) -> bool {
        RealtimeClient::leave_room(self, room)
    }
}

/// Throttled outbound actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundAction {
    Activity,
    Viewing,
    Typing,
    Editing,
}

#[derive(Debug, Clone, Default)]
pub struct OutboundThrottle {
    windows: OutboundWindows,
    shared_last_ms: Option<i64>,
    per_action_ms: HashMap<OutboundAction, i64>,
}

impl OutboundThrottle {
    pub fn new(windows: OutboundWindows) -> Self {
        Self {
            windows,
            shared_last_ms: None,
            per_action_ms: HashMap::new(),
        }
    }

    fn window_ms(&self, action: OutboundAction) -> i64 {
        match action {
            OutboundAction::Activity => self.windows.activity_ms,
            OutboundAction::Viewing => self.windows.viewing_ms,
            OutboundAction::Typing => self.windows.typing_ms,
            OutboundAction::Editing => self.windows.editing_ms,
        }
    }

    fn last_ms(&self, action: OutboundAction) -> Option<i64> {
        if self.windows.independent {
            self.per_action_ms.get(&action).copied()
        } else {
            self.shared_last_ms
        }
    }

    pub fn allows(&self, action: OutboundAction, now_ms: i64) -> bool {
        match self.last_ms(action) {
            Some(last) => now_ms - last >= self.window_ms(action),
            None => true,
        }
    }

    /// Note a successful emission.
    pub fn record(&mut self, action: OutboundAction, now_ms: i64) {
        if self.windows.independent {
            self.per_action_ms.insert(action, now_ms);
        } else {
            self.shared_last_ms = Some(now_ms);
        }
    }

    pub fn reset(&mut self) {
        self.shared_last_ms = None;
        self.per_action_ms.clear();
    }
}

/// Sends client-initiated presence events.
pub struct ActivityEmitter {
    sink: Arc<dyn OutboundSink>,
    clock: Arc<dyn Clock>,
    throttle: Mutex<OutboundThrottle>,
    authenticated: AtomicBool,
}

impl ActivityEmitter {
    pub fn new(sink: Arc<dyn OutboundSink>, clock: Arc<dyn Clock>, windows: OutboundWindows) -> Self {
        Self {
            sink,
            clock,
            throttle: Mutex::new(OutboundThrottle::new(windows)),
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    fn ready(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst) && self.sink.is_connected()
    }

    fn emit(&self, event: OutboundEvent) -> bool {
        self.ready() && self.sink.send(event)
    }

    fn emit_throttled(&self, action: OutboundAction, event: OutboundEvent) -> bool {
        if !self.ready() {
            return false;
        }
        let now = self.clock.now_ms();
        let mut throttle = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !throttle.allows(action, now) {
            trace!(?action, "outbound event throttled");
            return false;
        }
        let sent = self.sink.send(event);
        if sent {
            throttle.record(action, now);
        }
        sent
    }

    /// Report an action on a resource. Returns whether it was sent.
    pub fn track_activity(
        &self,
        resource: &str,
        action: &str,
        resource_id: &str,
        details: Value,
    ) -> bool {
        self.emit_throttled(
            OutboundAction::Activity,
            OutboundEvent::ActivityUpdate(ActivityUpdate {
                resource: resource.to_string(),
                action: action.to_string(),
                resource_id: resource_id.to_string(),
                details,
            }),
        )
    }

    pub fn track_viewing(&self, resource: &str, resource_id: &str) -> bool {
        self.emit_throttled(
            OutboundAction::Viewing,
            OutboundEvent::Viewing(ResourceRef::new(resource, resource_id)),
        )
    }

    pub fn start_typing(&self, resource: &str, resource_id: &str) -> bool {
        self.emit_throttled(
            OutboundAction::Typing,
            OutboundEvent::TypingStart(ResourceRef::new(resource, resource_id)),
        )
    }

    pub fn stop_typing(&self, resource: &str, resource_id: &str) -> bool {
        self.emit(OutboundEvent::TypingStop(ResourceRef::new(
            resource,
            resource_id,
        )))
    }

    pub fn start_editing(&self, resource: &str, resource_id: &str) -> bool {
        self.emit_throttled(
            OutboundAction::Editing,
            OutboundEvent::EditingStart(ResourceRef::new(resource, resource_id)),
        )
    }

    pub fn stop_editing(&self, resource: &str, resource_id: &str) -> bool {
        self.emit(OutboundEvent::EditingStop(ResourceRef::new(
            resource,
            resource_id,
        )))
    }

    pub fn join_room(&self, room: &str) -> bool {
        trace!(room, "join_room");
        self.sink.join_room(room)
    }

    pub fn leave_room(&self, room: &str) -> bool {
        trace!(room, "leave_room");
        self.sink.leave_room(room)
    }

    /// Ask the server for the full roster.
    pub fn request_online_users(&self) -> bool {
        self.emit(OutboundEvent::GetOnlineUsers)
    }

    pub fn reset(&self) {
        self.throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct RecordingSink {
        connected: AtomicBool,
        sent: Mutex<Vec<OutboundEvent>>,
        rooms: Mutex<std::collections::BTreeSet<String>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<OutboundEvent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl OutboundSink for RecordingSink {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn send(&self, event: OutboundEvent) -> bool {
            self.sent.lock().unwrap().push(event);
            true
        }

        fn join_room(&self, room: &str) -> bool {
            self.rooms.lock().unwrap().insert(room.to_string());
            self.is_connected() && self.send(OutboundEvent::JoinRoom(room.to_string()))
        }

        fn leave_room(&self, room: &str) -> bool {
            self.rooms.lock().unwrap().remove(room);
            self.is_connected() && self.send(OutboundEvent::LeaveRoom(room.to_string()))
        }
    }

    fn emitter(windows: OutboundWindows) -> (ActivityEmitter, Arc<RecordingSink>, ManualClock) {
        let sink = Arc::new(RecordingSink::default());
        sink.connected.store(true, Ordering::SeqCst);
        let clock = ManualClock::new(1_000_000);
        let emitter = ActivityEmitter::new(sink.clone(), Arc::new(clock.clone()), windows);
        emitter.set_authenticated(true);
        (emitter, sink, clock)
    }

    #[test]
    fn viewing_suppressed_by_recent_activity() {
        let (emitter, sink, clock) = emitter(OutboundWindows::default());
        assert!(emitter.track_activity("cardholder", "view", "123", Value::Null));
        clock.advance(4000);
        assert!(!emitter.track_viewing("cardholder", "123"));
        assert_eq!(sink.sent().len(), 1);

        clock.advance(6000);
        assert!(emitter.track_viewing("cardholder", "123"));
    }

    #[test]
    fn activity_throttled_for_5000ms() {
        let (emitter, _sink, clock) = emitter(OutboundWindows::default());
        assert!(emitter.track_activity("statement", "open", "1", Value::Null));
        clock.advance(4999);
        assert!(!emitter.track_activity("statement", "open", "2", Value::Null));
        clock.advance(1);
        assert!(emitter.track_activity("statement", "open", "2", Value::Null));
    }

    #[test]
    fn typing_and_editing_windows_share_the_timestamp() {
        let (emitter, _sink, clock) = emitter(OutboundWindows::default());
        assert!(emitter.start_typing("cardholder", "1"));
        clock.advance(3000);
        assert!(!emitter.start_editing("cardholder", "1"));
        assert!(emitter.start_typing("cardholder", "1"));
        clock.advance(5000);
        assert!(emitter.start_editing("cardholder", "1"));
    }

    #[test]
    fn suppressed_calls_do_not_reset_the_timer() {
        let (emitter, _sink, clock) = emitter(OutboundWindows::default());
        assert!(emitter.track_activity("r", "a", "1", Value::Null));
        clock.advance(3000);
        assert!(!emitter.track_activity("r", "a", "1", Value::Null));
        clock.advance(2000);
        assert!(emitter.track_activity("r", "a", "1", Value::Null));
    }

    #[test]
    fn independent_windows_decouple_actions() {
        let (emitter, _sink, clock) = emitter(OutboundWindows {
            independent: true,
            ..OutboundWindows::default()
        });
        assert!(emitter.track_activity("cardholder", "view", "123", Value::Null));
        clock.advance(4000);
        assert!(emitter.track_viewing("cardholder", "123"));
        assert!(!emitter.track_activity("cardholder", "view", "123", Value::Null));
    }

    #[test]
    fn stop_and_room_events_are_never_throttled() {
        let (emitter, sink, _clock) = emitter(OutboundWindows::default());
        assert!(emitter.start_typing("cardholder", "1"));
        for _ in 0..3 {
            assert!(emitter.stop_typing("cardholder", "1"));
            assert!(emitter.stop_editing("cardholder", "1"));
            assert!(emitter.join_room("module_cardholder"));
            assert!(emitter.leave_room("module_cardholder"));
        }
        assert_eq!(sink.sent().len(), 13);
    }

    #[test]
    fn no_op_when_disconnected() {
        let (emitter, sink, _clock) = emitter(OutboundWindows::default());
        sink.connected.store(false, Ordering::SeqCst);
        assert!(!emitter.track_activity("r", "a", "1", Value::Null));
        assert!(!emitter.stop_typing("r", "1"));
        assert!(!emitter.join_room("module_r"));
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn offline_room_changes_still_reach_the_sink() {
        let (emitter, sink, _clock) = emitter(OutboundWindows::default());
        emitter.join_room("module_r");
        emitter.join_room("module_s");
        sink.connected.store(false, Ordering::SeqCst);
        emitter.set_authenticated(false);

        assert!(!emitter.leave_room("module_r"));
        let rooms: Vec<String> = sink.rooms.lock().unwrap().iter().cloned().collect();
        assert_eq!(rooms, vec!["module_s"]);
    }

    #[test]
    fn no_op_without_user() {
        let (emitter, sink, _clock) = emitter(OutboundWindows::default());
        emitter.set_authenticated(false);
        assert!(!emitter.track_viewing("r", "1"));
        assert!(!emitter.request_online_users());
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn suppressed_while_offline_does_not_consume_window() {
        let (emitter, sink, _clock) = emitter(OutboundWindows::default());
        sink.connected.store(false, Ordering::SeqCst);
        assert!(!emitter.track_viewing("r", "1"));
        sink.connected.store(true, Ordering::SeqCst);
        assert!(emitter.track_viewing("r", "1"));
    }

    #[test]
    fn reset_clears_throttle() {
        let (emitter, _sink, _clock) = emitter(OutboundWindows::default());
        assert!(emitter.track_activity("r", "a", "1", Value::Null));
        emitter.reset();
        assert!(emitter.track_viewing("r", "1"));
    }

    #[test]
    fn emitted_payload_shape() {
        let (emitter, sink, _clock) = emitter(OutboundWindows::default());
        emitter.track_viewing("statement", "42");
        assert_eq!(
            sink.sent(),
            vec![OutboundEvent::Viewing(ResourceRef::new("statement", "42"))]
        );
    }
}
