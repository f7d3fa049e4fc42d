use super::connection::ConnectionState;
use crate::infrastructure::{OutboundQueue, TaskManager};
use crate::subscription::SubscriptionRegistry;
use crate::types::ChannelError;
use std::time::Instant;
use tokio::sync::watch;

/// Consolidated mutable state for TaskChannel
/// Using a single struct reduces lock contention
pub struct ClientState {
    /// When the in-flight heartbeat probe was sent, if one is pending
    pub pending_probe: Option<Instant>,

    /// Task-id subscriptions managed by this channel
    pub registry: SubscriptionRegistry,

    /// Frames written while not open, flushed on the next open
    pub queue: OutboundQueue,

    /// Background task manager
    pub task_manager: TaskManager,

    /// Whether the disconnect was manual (prevents auto-reconnect)
    pub was_manual_disconnect: bool,

    /// Sender for state change notifications
    pub state_change_tx: Option<watch::Sender<(ConnectionState, bool)>>,

    /// Most recent failure, for the observable error surface
    pub last_error: Option<ChannelError>,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            pending_probe: None,
            registry: SubscriptionRegistry::new(),
            queue: OutboundQueue::new(),
            task_manager: TaskManager::new(),
            was_manual_disconnect: false,
            state_change_tx: None,
            last_error: None,
        }
    }

    /// Notify state change watchers
    pub fn notify_state_change(&self, state: ConnectionState, manual: bool) {
        if let Some(tx) = &self.state_change_tx
            && tx.send((state, manual)).is_err()
        {
            tracing::debug!(
                "State change watcher disconnected, could not notify state: {:?}",
                state
            );
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
