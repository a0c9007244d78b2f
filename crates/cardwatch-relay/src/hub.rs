//! Hub: every live connection, the user behind it, and its rooms.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use cardwatch_common::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use crate::directory::DirectoryUser;

struct Client {
    user: DirectoryUser,
    tx: mpsc::Sender<String>,
    rooms: HashSet<String>,
}

/// Thread-safe connection registry.
#[derive(Clone, Default)]
pub struct Hub {
    clients: Arc<RwLock<HashMap<ConnectionId, Client>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns true if this is the user's first
    /// live connection.
    pub async fn register(
        &self,
        conn: ConnectionId,
        user: DirectoryUser,
        tx: mpsc::Sender<String>,
    ) -> bool {
        let mut map = self.clients.write().await;
        let first = !map.values().any(|c| c.user.id == user.id);
        map.insert(
            conn,
            Client {
                user,
                tx,
                rooms: HashSet::new(),
            },
        );
        first
    }

    /// Remove a connection. Returns the user id if that was the user's
    /// last connection.
    pub async fn unregister(&self, conn: &ConnectionId) -> Option<String> {
        let mut map = self.clients.write().await;
        let client = map.remove(conn)?;
        let still_online = map.values().any(|c| c.user.id == client.user.id);
        (!still_online).then_some(client.user.id)
    }

    pub async fn join(&self, conn: &ConnectionId, room: &str) -> bool {
        let mut map = self.clients.write().await;
        match map.get_mut(conn) {
            Some(client) => client.rooms.insert(room.to_string()),
            None => false,
        }
    }

    pub async fn leave(&self, conn: &ConnectionId, room: &str) -> bool {
        let mut map = self.clients.write().await;
        match map.get_mut(conn) {
            Some(client) => client.rooms.remove(room),
            None => false,
        }
    }

    /// One entry per online user, ordered by id.
    pub async fn roster(&self) -> Vec<DirectoryUser> {
        let map = self.clients.read().await;
        let unique: BTreeMap<&str, &DirectoryUser> = map
            .values()
            .map(|c| (c.user.id.as_str(), &c.user))
            .collect();
        unique.into_values().cloned().collect()
    }

    /// Send `frame` to every connection except `from`. Returns how many
    /// took it.
    pub async fn broadcast_except(&self, from: &ConnectionId, frame: String) -> usize {
        let targets: Vec<mpsc::Sender<String>> = {
            let map = self.clients.read().await;
            map.iter()
                .filter(|(id, _)| *id != from)
                .map(|(_, c)| c.tx.clone())
                .collect()
        };
        deliver(targets, frame)
    }

    /// Send `frame` to the other members of `room`.
    pub async fn send_to_room_except(&self, room: &str, from: &ConnectionId, frame: String) -> usize {
        let targets: Vec<mpsc::Sender<String>> = {
            let map = self.clients.read().await;
            map.iter()
                .filter(|(id, c)| *id != from && c.rooms.contains(room))
                .map(|(_, c)| c.tx.clone())
                .collect()
        };
        deliver(targets, frame)
    }

    pub async fn rooms_of(&self, conn: &ConnectionId) -> Vec<String> {
        let map = self.clients.read().await;
        let mut rooms: Vec<String> = map
            .get(conn)
            .map(|c| c.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Best-effort fan-out. Never waits on a peer: a full queue drops the
/// frame for that peer only. Returns how many peers got it.
fn deliver(targets: Vec<mpsc::Sender<String>>, frame: String) -> usize {
    let mut delivered = 0;
    for tx in targets {
        match tx.try_send(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Peer queue full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Receiver channel closed mid-broadcast");
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(16)
    }

    #[tokio::test]
    async fn first_and_last_connection_of_a_user() {
        let hub = Hub::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();

        assert!(hub.register(c1.clone(), DirectoryUser::new("u"), tx1).await);
        assert!(!hub.register(c2.clone(), DirectoryUser::new("u"), tx2).await);
        assert_eq!(hub.roster().await.len(), 1);

        assert_eq!(hub.unregister(&c1).await, None);
        assert_eq!(hub.unregister(&c2).await.as_deref(), Some("u"));
        assert_eq!(hub.count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let hub = Hub::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let a = ConnectionId::new();
        hub.register(a.clone(), DirectoryUser::new("a"), tx_a).await;
        hub.register(ConnectionId::new(), DirectoryUser::new("b"), tx_b).await;

        assert_eq!(hub.broadcast_except(&a, "hi".into()).await, 1);
        assert_eq!(rx_b.recv().await.as_deref(), Some("hi"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_fanout_reaches_members_only() {
        let hub = Hub::new();
        let (tx_a, _rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let (tx_c, mut rx_c) = channel();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        hub.register(a.clone(), DirectoryUser::new("a"), tx_a).await;
        hub.register(b.clone(), DirectoryUser::new("b"), tx_b).await;
        hub.register(ConnectionId::new(), DirectoryUser::new("c"), tx_c).await;

        assert!(hub.join(&a, "module_statement").await);
        assert!(hub.join(&b, "module_statement").await);
        assert!(!hub.join(&b, "module_statement").await);

        assert_eq!(hub.send_to_room_except("module_statement", &a, "v".into()).await, 1);
        assert_eq!(rx_b.recv().await.as_deref(), Some("v"));
        assert!(rx_c.try_recv().is_err());

        assert!(hub.leave(&b, "module_statement").await);
        assert_eq!(hub.send_to_room_except("module_statement", &a, "v".into()).await, 0);
        assert!(hub.rooms_of(&b).await.is_empty());
    }

    #[tokio::test]
    async fn full_peer_queue_does_not_block_fan_out() {
        let hub = Hub::new();
        let (tx_a, _rx_a) = channel();
        let (tx_slow, mut rx_slow) = mpsc::channel(1);
        let (tx_b, mut rx_b) = channel();
        let a = ConnectionId::new();
        hub.register(a.clone(), DirectoryUser::new("a"), tx_a).await;
        hub.register(ConnectionId::new(), DirectoryUser::new("slow"), tx_slow).await;
        hub.register(ConnectionId::new(), DirectoryUser::new("b"), tx_b).await;

        assert_eq!(hub.broadcast_except(&a, "one".into()).await, 2);
        // The slow peer's queue is now full; the second frame skips it.
        let sent = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            hub.broadcast_except(&a, "two".into()),
        )
        .await
        .unwrap();
        assert_eq!(sent, 1);

        assert_eq!(rx_slow.recv().await.unwrap(), "one");
        assert!(rx_slow.try_recv().is_err());
        assert_eq!(rx_b.recv().await.unwrap(), "one");
        assert_eq!(rx_b.recv().await.unwrap(), "two");
    }
}
