// WebSocket hub for cross-window state synchronization.
//
// Each open window (dashboard, operator console, scoreboard) connects as a
// client. Inbound text frames are forwarded to the app loop as
// [`SyncEvent`]s; outbound state broadcasts fan out through the shared
// [`PeerMap`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

/// Events emitted by the hub to the application layer.
#[derive(Debug, PartialEq)]
pub enum SyncEvent {
    /// A new window has connected.
    Connected { peer_id: u64, addr: String },
    /// A window has disconnected.
    Disconnected { peer_id: u64 },
    /// A text frame was received from a window (raw JSON string).
    Message { peer_id: u64, text: String },
}

/// Registry of connected windows and their outbound channels.
///
/// Cloneable handle; the app loop broadcasts through one clone while the
/// hub's accept loop registers and removes peers through another.
#[derive(Clone, Default)]
pub struct PeerMap {
    inner: Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Message>>>>,
    next_id: Arc<AtomicU64>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new peer; returns its id and the receiving half of its
    /// outbound channel (drained by the connection's writer task).
    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<Message>) {
        let peer_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(peer_id, tx);
        (peer_id, rx)
    }

    pub fn remove(&self, peer_id: u64) {
        self.lock().remove(&peer_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Send a text frame to every connected window.
    pub fn broadcast(&self, text: &str) {
        self.send_where(text, |_| true);
    }

    /// Send a text frame to every window except `skip`. Used when relaying
    /// a frame back out so the originating window doesn't receive its own
    /// update.
    pub fn broadcast_except(&self, text: &str, skip: u64) {
        self.send_where(text, |id| id != skip);
    }

    /// Send a text frame to a single window.
    pub fn send_to(&self, peer_id: u64, text: &str) {
        self.send_where(text, |id| id == peer_id);
    }

    fn send_where(&self, text: &str, keep: impl Fn(u64) -> bool) {
        let map = self.lock();
        for (peer_id, tx) in map.iter().filter(|(id, _)| keep(**id)) {
            // A send failure means the writer task already exited; the
            // accept loop cleans the entry up on disconnect.
            if tx.send(Message::Text(text.into())).is_err() {
                warn!("peer {peer_id} outbound channel closed");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<Message>>> {
        self.inner.lock().expect("peer map mutex poisoned")
    }
}

/// Bind the hub's TCP listener on localhost.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    info!("Sync hub listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept window connections forever, forwarding their frames through `tx`.
///
/// Each connection gets a writer task (draining its [`PeerMap`] channel) and
/// a reader loop; both are torn down and the peer deregistered when the
/// window goes away.
pub async fn run(
    listener: TcpListener,
    peers: PeerMap,
    tx: mpsc::Sender<SyncEvent>,
) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let addr_str = addr.to_string();

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {addr_str}: {e}");
                continue;
            }
        };

        let (peer_id, mut outbound_rx) = peers.register();
        info!("Window {peer_id} connected from {addr_str}");

        if tx
            .send(SyncEvent::Connected {
                peer_id,
                addr: addr_str.clone(),
            })
            .await
            .is_err()
        {
            // App loop is gone; stop accepting.
            peers.remove(peer_id);
            break;
        }

        let (mut write, read) = ws_stream.split();
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let peers_for_conn = peers.clone();
        let tx_for_conn = tx.clone();
        tokio::spawn(async move {
            let result =
                process_message_stream(read, &tx_for_conn, peer_id, &addr_str).await;
            peers_for_conn.remove(peer_id);
            writer.abort();
            if result.is_ok() {
                let _ = tx_for_conn
                    .send(SyncEvent::Disconnected { peer_id })
                    .await;
            }
        });
    }

    Ok(())
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx`. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
///
/// Generic over the stream type so it can be tested with in-memory streams
/// without opening TCP ports.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<SyncEvent>,
    peer_id: u64,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = SyncEvent::Message {
                    peer_id,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Window {peer_id} ({addr}) sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from window {peer_id} ({addr}): {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}
