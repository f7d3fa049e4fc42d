mod backoff;
mod queue;
mod task_manager;

pub use backoff::ReconnectPolicy;
pub use queue::OutboundQueue;
pub use task_manager::TaskManager;
