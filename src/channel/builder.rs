use super::{ClientState, ConnectionManager, ConnectionState, TaskChannel};
use crate::infrastructure::ReconnectPolicy;
use crate::types::constants::{
    RECONNECT_BACKOFF_MULTIPLIER, RECONNECT_BASE_DELAY, RECONNECT_MAX_ATTEMPTS,
    RECONNECT_MAX_DELAY,
};
use crate::types::{ChannelError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use url::Url;

/// Tuning parameters for a task channel. All durations are milliseconds;
/// `None` falls back to the conservative defaults in `types::constants`.
#[derive(Debug, Clone, Default)]
pub struct TaskChannelOptions {
    /// Opaque credential appended to the connection URL as a query parameter
    pub credential: Option<String>,
    pub heartbeat_interval: Option<u64>,
    /// Ack window for each probe; must stay well below `heartbeat_interval`
    pub heartbeat_timeout: Option<u64>,
    pub reconnect_base_delay: Option<u64>,
    pub reconnect_backoff_multiplier: Option<f64>,
    pub reconnect_max_delay: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
}

impl TaskChannelOptions {
    /// Fresh backoff policy for one reconnect cycle
    pub(crate) fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_delay.unwrap_or(RECONNECT_BASE_DELAY)),
            self.reconnect_backoff_multiplier
                .unwrap_or(RECONNECT_BACKOFF_MULTIPLIER),
            Some(Duration::from_millis(
                self.reconnect_max_delay.unwrap_or(RECONNECT_MAX_DELAY),
            )),
            self.reconnect_max_attempts.unwrap_or(RECONNECT_MAX_ATTEMPTS),
        )
    }
}

/// Builder for TaskChannel that handles initialization
pub struct TaskChannelBuilder {
    endpoint: String,
    options: TaskChannelOptions,
}

impl TaskChannelBuilder {
    /// Create a new builder, validating the endpoint URL
    pub fn new(endpoint: impl Into<String>, options: TaskChannelOptions) -> Result<Self> {
        let endpoint = endpoint.into();

        let url = Url::parse(&endpoint)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ChannelError::Config(format!(
                    "unsupported endpoint scheme '{}', expected ws or wss",
                    other
                )));
            }
        }

        Ok(Self { endpoint, options })
    }

    /// Build the channel and spawn the reconnection watcher.
    ///
    /// Construction has no transport side effects; the consumer decides when
    /// to call `connect()`.
    pub fn build(self) -> TaskChannel {
        let mut client_state = ClientState::new();

        // Initialize state watcher channel
        let (state_tx, state_rx) = watch::channel((ConnectionState::Idle, false));
        client_state.state_change_tx = Some(state_tx);

        let channel = TaskChannel {
            endpoint: self.endpoint,
            options: self.options,
            connection: Arc::new(ConnectionManager::new()),
            state: Arc::new(RwLock::new(client_state)),
            flush_lock: Arc::new(Mutex::new(())),
        };

        // Spawn reconnection watcher task
        let channel_for_watcher = channel.clone();
        tokio::spawn(async move {
            let mut rx = state_rx;

            while rx.changed().await.is_ok() {
                let (state, was_manual) = *rx.borrow_and_update();

                // Retry only on unexpected loss, never after disconnect()
                if matches!(state, ConnectionState::Reconnecting) && !was_manual {
                    tracing::info!("state watcher detected connection loss, attempting reconnection");

                    if let Err(e) = channel_for_watcher.try_reconnect().await {
                        tracing::error!("reconnection watcher failed: {}", e);
                    }
                }
            }
            tracing::debug!("reconnection watcher task finished");
        });

        channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_scheme() {
        let result = TaskChannelBuilder::new("https://example.com/sync", Default::default());
        assert!(matches!(result, Err(ChannelError::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_url() {
        let result = TaskChannelBuilder::new("not a url", Default::default());
        assert!(matches!(result, Err(ChannelError::UrlParse(_))));
    }

    #[test]
    fn test_accepts_ws_and_wss() {
        assert!(TaskChannelBuilder::new("ws://localhost:4000/sync", Default::default()).is_ok());
        assert!(TaskChannelBuilder::new("wss://example.com/sync", Default::default()).is_ok());
    }

    #[test]
    fn test_default_options_produce_documented_policy() {
        let options = TaskChannelOptions::default();
        let mut policy = options.reconnect_policy();
        assert_eq!(
            policy.next_delay(),
            Some(Duration::from_millis(RECONNECT_BASE_DELAY))
        );
    }
}
