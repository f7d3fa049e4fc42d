use crate::channel::{ClientState, ConnectionManager, ConnectionState};
use crate::messaging::Frame;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time;

/// Periodic liveness probe and timeout detector.
///
/// Every `interval`, while the connection is open, sends a heartbeat frame
/// and arms a `timeout` window. If no ack clears the pending probe inside
/// that window, the transport is force-closed, which the channel treats as
/// unexpected loss and answers with reconnection. This catches half-open
/// sockets that accept writes but no longer deliver reads.
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    connection: Weak<ConnectionManager>,
    state: Arc<RwLock<ClientState>>,
}

impl HeartbeatMonitor {
    pub fn new(connection: Weak<ConnectionManager>, state: Arc<RwLock<ClientState>>) -> Self {
        Self {
            interval: Duration::from_millis(crate::types::HEARTBEAT_INTERVAL),
            timeout: Duration::from_millis(crate::types::HEARTBEAT_TIMEOUT),
            connection,
            state,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawns the heartbeat task that runs periodically
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            // The connection was just established; the first probe waits a
            // full interval rather than firing immediately.
            let mut interval_timer =
                time::interval_at(time::Instant::now() + self.interval, self.interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;

                // Channel dropped, exit heartbeat task
                let Some(connection) = self.connection.upgrade() else {
                    break;
                };

                if !connection.is_open().await {
                    continue;
                }

                if let Err(e) = connection.send_frame(&Frame::heartbeat()).await {
                    tracing::error!("failed to send heartbeat probe: {}", e);
                    continue;
                }
                {
                    let mut state = self.state.write().await;
                    state.pending_probe = Some(Instant::now());
                }
                tracing::debug!("sent heartbeat probe");

                time::sleep(self.timeout).await;

                let still_pending = self.state.read().await.pending_probe.is_some();
                if still_pending {
                    tracing::warn!(
                        timeout_ms = self.timeout.as_millis() as u64,
                        "heartbeat ack missed, forcing close"
                    );
                    let _ = connection.close().await;
                    connection.set_state(ConnectionState::Reconnecting).await;

                    let mut state = self.state.write().await;
                    state.pending_probe = None;
                    let manual = state.was_manual_disconnect;
                    state.notify_state_change(ConnectionState::Reconnecting, manual);
                    break;
                }
            }
            tracing::debug!("heartbeat task finished");
        })
    }
}
