//! Public handle for the presence socket.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::protocol::OutboundEvent;

use super::connection::{connection_loop, LoopContext};
use super::types::{Backoff, ConnectionState, RealtimeEvent, TransportConfig};

/// A running connection loop.
struct ActiveSession {
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Inner {
    config: TransportConfig,
    backoff: Backoff,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::UnboundedSender<RealtimeEvent>,
    generation: Arc<AtomicU64>,
    /// Rooms every new session joins on open. Survives reconnects and
    /// explicit disconnects.
    rooms: Arc<Mutex<BTreeSet<String>>>,
    session: Mutex<Option<ActiveSession>>,
}

/// Handle for the single presence connection.
///
/// Clones share the same connection. Methods never block and never fail
/// outward; transport problems show up as state changes and events.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// Create an idle client. Returns `(client, event_receiver)`; every
    /// session the client ever opens reports on the same receiver.
    pub fn new(
        config: TransportConfig,
        backoff: Backoff,
    ) -> (Self, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let client = Self {
            inner: Arc::new(Inner {
                config,
                backoff,
                state_tx,
                event_tx,
                generation: Arc::new(AtomicU64::new(0)),
                rooms: Arc::new(Mutex::new(BTreeSet::new())),
                session: Mutex::new(None),
            }),
        };
        (client, event_rx)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<ActiveSession>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start connecting with `token`.
    ///
    /// No-op (returns `false`) while a connection or connect attempt is
    /// outstanding. After a rejected handshake or exhausted reconnects this
    /// starts over with a fresh backoff counter. Must be called from within
    /// a tokio runtime.
    pub fn connect(&self, token: &str) -> bool {
        let mut session = self.lock_session();
        if let Some(active) = session.as_ref() {
            if !active.task.is_finished() {
                debug!("connect ignored: connection already outstanding");
                return false;
            }
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.inner.state_tx.send_replace(ConnectionState::Connecting);

        let ctx = LoopContext {
            config: self.inner.config.clone(),
            backoff: self.inner.backoff,
            token: token.to_string(),
            generation,
            current_generation: Arc::clone(&self.inner.generation),
            rooms: Arc::clone(&self.inner.rooms),
            state_tx: self.inner.state_tx.clone(),
            event_tx: self.inner.event_tx.clone(),
        };
        let task = tokio::spawn(connection_loop(ctx, outbound_rx, shutdown_rx));

        *session = Some(ActiveSession {
            outbound_tx,
            shutdown_tx,
            task,
        });
        true
    }

    fn take_session(&self) -> Option<ActiveSession> {
        let mut session = self.lock_session();
        let taken = session.take();
        // Invalidate anything the old loop still has in flight.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .state_tx
            .send_replace(ConnectionState::Disconnected);
        taken
    }

    /// Explicit disconnect: cancels a pending reconnect timer and closes
    /// the socket. Returns `false` if there was nothing to disconnect.
    pub fn disconnect(&self) -> bool {
        match self.take_session() {
            Some(active) => {
                let _ = active.shutdown_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Disconnect and wait for the socket to finish closing.
    pub async fn shutdown(&self) {
        if let Some(active) = self.take_session() {
            let _ = active.shutdown_tx.send(());
            let _ = active.task.await;
        }
    }

    /// Queue a frame for the current connection. Frames queued while
    /// reconnecting go out once the socket is back.
    pub fn send(&self, event: OutboundEvent) -> bool {
        match self.lock_session().as_ref() {
            Some(active) => active.outbound_tx.send(event).is_ok(),
            None => false,
        }
    }

    fn lock_rooms(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.inner.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a room to the re-join set and, if a session exists, queue the
    /// join. Offline joins take effect when the next session opens.
    pub fn join_room(&self, room: &str) -> bool {
        self.lock_rooms().insert(room.to_string());
        self.send(OutboundEvent::JoinRoom(room.to_string()))
    }

    /// Drop a room from the re-join set and, if a session exists, queue
    /// the leave. Takes effect even while reconnecting.
    pub fn leave_room(&self, room: &str) -> bool {
        self.lock_rooms().remove(room);
        self.send(OutboundEvent::LeaveRoom(room.to_string()))
    }

    /// Rooms the next session will join.
    pub fn rooms(&self) -> Vec<String> {
        self.lock_rooms().iter().cloned().collect()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether an event was produced by the live session.
    pub fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }
}
