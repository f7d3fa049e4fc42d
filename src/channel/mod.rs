// Module declarations
mod builder;
mod connection;
mod core;
mod state;

// Public API exports
pub use builder::{TaskChannelBuilder, TaskChannelOptions};
pub use connection::{ConnectionManager, ConnectionState};
pub use core::TaskChannel;
pub use state::ClientState;
