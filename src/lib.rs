//! # tasksync
//!
//! A resilient push-update channel that keeps client-side task state
//! synchronized with server-side progress over an unreliable, long-lived
//! WebSocket connection.
//!
//! The channel maintains one multiplexed logical connection, detects silent
//! failures via heartbeats, reconnects with exponential backoff, queues
//! frames written while offline, and routes inbound events to per-task
//! subscribers.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tasksync::{Frame, TaskChannel, TaskChannelOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = TaskChannel::new(
//!         "wss://tasks.example.com/sync",
//!         TaskChannelOptions {
//!             credential: Some("opaque-token".to_string()),
//!             ..Default::default()
//!         },
//!     )?;
//!
//!     channel.connect().await?;
//!
//!     channel
//!         .subscribe("task-42", Arc::new(|frame: &Frame| {
//!             println!("update: {:?}", frame.data);
//!         }))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod heartbeat;
pub mod infrastructure;
pub mod messaging;
pub mod subscription;
pub mod types;
pub mod websocket;

pub use channel::{
    ConnectionManager, ConnectionState, TaskChannel, TaskChannelBuilder, TaskChannelOptions,
};
pub use heartbeat::HeartbeatMonitor;
pub use infrastructure::{OutboundQueue, ReconnectPolicy, TaskManager};
pub use messaging::{Frame, FrameRouter, FrameType};
pub use subscription::{SubscriptionHandle, SubscriptionRegistry, TaskCallback};
pub use types::{ChannelError, Result};
