//! Background connection loop with auto-reconnect.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use cardwatch_common::PresenceError;

use crate::protocol::OutboundEvent;

use super::transport::{self, send_event, Transport};
use super::types::{Backoff, ConnectionState, RealtimeEvent, RealtimeEventKind, TransportConfig};

/// Everything one connection loop needs, fixed for its lifetime.
pub(crate) struct LoopContext {
    pub(crate) config: TransportConfig,
    pub(crate) backoff: Backoff,
    pub(crate) token: String,
    pub(crate) generation: u64,
    pub(crate) current_generation: Arc<AtomicU64>,
    /// Owned by the client; joins and leaves land here even while offline.
    pub(crate) rooms: Arc<Mutex<BTreeSet<String>>>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    pub(crate) event_tx: mpsc::UnboundedSender<RealtimeEvent>,
}

impl LoopContext {
    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    /// Publish a state change unless a newer `connect()`/`disconnect()`
    /// has taken over.
    fn set_state(&self, next: ConnectionState) {
        if !self.is_current() {
            return;
        }
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    fn rooms(&self) -> Vec<String> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn emit(&self, kind: RealtimeEventKind) {
        let _ = self.event_tx.send(RealtimeEvent {
            generation: self.generation,
            kind,
        });
    }
}

enum SessionEnd {
    /// Explicit disconnect. No reconnect.
    Local,
    Dropped(PresenceError),
}

/// Connect, serve, and reconnect with backoff until told to stop, the
/// token is rejected, or the attempts run out.
pub(crate) async fn connection_loop(
    ctx: LoopContext,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut attempt: u32 = 0;

    loop {
        info!(url = %ctx.config.server_url, attempt, "Connecting to presence server");

        let opened = tokio::select! {
            result = transport::open(&ctx.config, &ctx.token) => result,
            _ = &mut shutdown_rx => {
                debug!("connect cancelled by disconnect");
                return;
            }
        };

        match opened {
            Ok(transport) => {
                attempt = 0;
                info!(framing = ?transport.framing, "Presence connected");
                ctx.set_state(ConnectionState::Connected);
                ctx.emit(RealtimeEventKind::Connected {
                    user_id: transport.user_id.clone(),
                });

                let end = run_session(&ctx, transport, &mut outbound_rx, &mut shutdown_rx).await;
                match end {
                    SessionEnd::Local => {
                        info!("Presence disconnected");
                        return;
                    }
                    SessionEnd::Dropped(e) => {
                        warn!(error = %e, "Presence connection lost");
                        ctx.emit(RealtimeEventKind::Dropped {
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Err(PresenceError::HandshakeRejected(reason)) => {
                error!(reason = %reason, "Presence handshake rejected");
                ctx.set_state(ConnectionState::Failed);
                ctx.emit(RealtimeEventKind::Rejected { reason });
                return;
            }
            Err(e) => {
                warn!(attempt, error = %e, "Presence connect failed");
            }
        }

        let Some(delay) = ctx.backoff.delay(attempt) else {
            error!(attempts = attempt, "Presence reconnect attempts exhausted");
            ctx.set_state(ConnectionState::Failed);
            ctx.emit(RealtimeEventKind::GaveUp);
            return;
        };
        attempt += 1;
        ctx.set_state(ConnectionState::Reconnecting);
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt, "Reconnecting in {}ms", delay.as_millis()
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => {
                debug!("reconnect timer cancelled by disconnect");
                return;
            }
        }
    }
}

/// Pump frames both ways until the socket drops or we are told to stop.
async fn run_session(
    ctx: &LoopContext,
    transport: Transport,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let Transport {
        mut sink,
        mut stream,
        framing,
        ..
    } = transport;

    for room in ctx.rooms() {
        debug!(room = %room, "re-joining room");
        if let Err(e) = send_event(&mut sink, framing, &OutboundEvent::JoinRoom(room)).await {
            return SessionEnd::Dropped(e);
        }
    }

    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return SessionEnd::Local;
            }

            cmd = outbound_rx.recv() => {
                let Some(event) = cmd else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return SessionEnd::Local;
                };
                if let Err(e) = send_event(&mut sink, framing, &event).await {
                    return SessionEnd::Dropped(e);
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return SessionEnd::Dropped(PresenceError::Closed);
                    }
                    Some(Ok(msg)) => match transport::decode_frame(&msg) {
                        Some(Ok(envelope)) => ctx.emit(RealtimeEventKind::Message(envelope)),
                        Some(Err(e)) => warn!(error = %e, "Dropping unreadable frame"),
                        None => {}
                    },
                    Some(Err(e)) => {
                        return SessionEnd::Dropped(PresenceError::Connect(e.to_string()));
                    }
                }
            }
        }
    }
}
