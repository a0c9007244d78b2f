//! cardwatch-relay: presence fan-out server.
//!
//! Authenticates websocket clients against a token [`Directory`], tracks
//! which users are online and which module rooms each connection has
//! joined, and turns client presence frames into indicator events for the
//! other clients. It keeps no history and never throttles.

mod connection;
pub mod directory;
pub mod hub;
pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;

pub use directory::{Directory, DirectoryUser};
pub use hub::Hub;

/// Accept connections on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, directory: Directory) {
    let hub = Hub::new();
    let directory = Arc::new(directory);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let hub = hub.clone();
                let directory = Arc::clone(&directory);
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => connection::handle_connection(ws, addr, hub, directory).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Bind `addr` and serve in the background. Returns the bound address,
/// which matters when `addr` asks for port 0.
pub async fn spawn(
    addr: SocketAddr,
    directory: Directory,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!("cardwatch-relay listening on {}", local);
    Ok((local, tokio::spawn(serve(listener, directory))))
}
