use crate::messaging::Frame;
use crate::types::{ChannelError, Result};
use crate::websocket::WsStream;
use futures::SinkExt;
use futures::stream::SplitSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

/// Lifecycle of the one physical connection a channel owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, `connect()` never called
    Idle,
    /// Transport handshake in flight
    Connecting,
    /// Transport established, frames flowing
    Open,
    /// Transport lost unexpectedly, retries pending
    Reconnecting,
    /// Terminal until the consumer calls `connect()` again
    Closed,
}

/// Owns the physical socket's write half and the connection state.
///
/// State transitions are driven by the channel, the heartbeat monitor and
/// the read task; this type is the single place they are recorded.
pub struct ConnectionManager {
    ws_write: Arc<RwLock<Option<SplitSink<WsStream, Message>>>>,
    state: Arc<RwLock<ConnectionState>>,
    open_count: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            ws_write: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            open_count: AtomicU64::new(0),
        }
    }

    /// Sets the WebSocket write sink (called after a successful handshake)
    pub async fn set_writer(&self, writer: SplitSink<WsStream, Message>) {
        let mut ws = self.ws_write.write().await;
        *ws = Some(writer);
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.write().await;
        *state = new_state;
    }

    /// Completes the handshake transition to `Open`; fails if the connection
    /// was torn down (or lost again) while connecting.
    pub async fn open_if_connecting(&self) -> bool {
        let mut state = self.state.write().await;
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Open;
            self.open_count.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Number of times the connection has reached `Open` over its lifetime
    pub fn opens(&self) -> u64 {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Atomically transitions to `Connecting` unless an attempt is already in
    /// flight or the connection is open. At most one physical connection
    /// attempt exists at any time.
    pub async fn begin_connect(&self) -> bool {
        let mut state = self.state.write().await;
        match *state {
            ConnectionState::Connecting | ConnectionState::Open => false,
            _ => {
                *state = ConnectionState::Connecting;
                true
            }
        }
    }

    pub async fn is_open(&self) -> bool {
        *self.state.read().await == ConnectionState::Open
    }

    /// Serializes and transmits one frame.
    ///
    /// Fails with `NotConnected` when no writer is attached so a mid-flush
    /// loss is visible to the caller.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        let message = Message::Text(json.into());

        let mut ws_guard = self.ws_write.write().await;
        match ws_guard.as_mut() {
            Some(ws) => {
                if let Err(e) = ws.send(message).await {
                    // A failed sink is unusable; drop it so later sends fail fast.
                    *ws_guard = None;
                    return Err(ChannelError::from(e));
                }
                Ok(())
            }
            None => Err(ChannelError::NotConnected),
        }
    }

    /// Closes the transport and detaches the writer.
    ///
    /// Deliberately does not touch the state: the caller decides whether this
    /// was a user-initiated close (`Closed`) or a forced one (`Reconnecting`).
    pub async fn close(&self) -> Result<()> {
        let mut ws_guard = self.ws_write.write().await;
        if let Some(ws) = ws_guard.as_mut() {
            ws.close().await?;
        }
        *ws_guard = None;
        Ok(())
    }

    /// Detaches the writer without a close handshake (transport already gone)
    pub async fn clear_writer(&self) {
        let mut ws = self.ws_write.write().await;
        *ws = None;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
