/// Wire frame type strings (magic strings layer)
pub mod frame_types {
    pub const HEARTBEAT: &str = "heartbeat";
    pub const HEARTBEAT_RESPONSE: &str = "heartbeat_response";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const TASK_UPDATE: &str = "task_update";
    pub const TASK_COMPLETE: &str = "task_complete";
    pub const TASK_ERROR: &str = "task_error";
}

/// Query parameter carrying the opaque credential token
pub const CREDENTIAL_PARAM: &str = "token";

/// Default heartbeat probe interval (milliseconds)
pub const HEARTBEAT_INTERVAL: u64 = 25_000;

/// Default heartbeat ack timeout (milliseconds); must stay well below the interval
pub const HEARTBEAT_TIMEOUT: u64 = 5_000;

/// Default reconnect backoff parameters
pub const RECONNECT_BASE_DELAY: u64 = 1_000;
pub const RECONNECT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const RECONNECT_MAX_DELAY: u64 = 30_000;
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// Max outbound frame buffer size while disconnected
pub const MAX_QUEUE_SIZE: usize = 1_000;
