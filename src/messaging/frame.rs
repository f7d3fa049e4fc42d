use crate::types::constants::frame_types;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Type-safe frame discriminator.
///
/// Unknown wire values deserialize to [`FrameType::Unknown`] so newer server
/// frame types never break parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// Client liveness probe
    Heartbeat,
    /// Server liveness ack
    HeartbeatResponse,
    /// Register interest in a task's updates
    Subscribe,
    /// Drop interest in a task's updates
    Unsubscribe,
    /// Incremental task progress
    TaskUpdate,
    /// Terminal success for a task
    TaskComplete,
    /// Terminal failure for a task
    TaskError,
    /// Any frame type this client version does not recognize
    #[serde(other)]
    Unknown,
}

impl FrameType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => frame_types::HEARTBEAT,
            Self::HeartbeatResponse => frame_types::HEARTBEAT_RESPONSE,
            Self::Subscribe => frame_types::SUBSCRIBE,
            Self::Unsubscribe => frame_types::UNSUBSCRIBE,
            Self::TaskUpdate => frame_types::TASK_UPDATE,
            Self::TaskComplete => frame_types::TASK_COMPLETE,
            Self::TaskError => frame_types::TASK_ERROR,
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One discrete JSON message exchanged over the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(rename = "taskId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Frame {
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            task_id: None,
            data: serde_json::Value::Null,
            timestamp: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Liveness probe sent by the heartbeat monitor
    pub fn heartbeat() -> Self {
        Self::new(FrameType::Heartbeat).with_timestamp(now_ms())
    }

    /// Liveness ack (server-to-client; constructed here for tests and tools)
    pub fn heartbeat_response() -> Self {
        Self::new(FrameType::HeartbeatResponse)
    }

    pub fn subscribe(task_id: impl Into<String>) -> Self {
        Self::new(FrameType::Subscribe)
            .with_task_id(task_id)
            .with_timestamp(now_ms())
    }

    pub fn unsubscribe(task_id: impl Into<String>) -> Self {
        Self::new(FrameType::Unsubscribe)
            .with_task_id(task_id)
            .with_timestamp(now_ms())
    }
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_wire_names() {
        let frame = Frame::subscribe("task-1");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"subscribe""#));
        assert!(json.contains(r#""taskId":"task-1""#));
        assert!(json.contains(r#""timestamp":"#));
    }

    #[test]
    fn test_heartbeat_carries_timestamp_only() {
        let frame = Frame::heartbeat();
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"heartbeat""#));
        assert!(!json.contains("taskId"));
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_task_update_round_trip() {
        let text = r#"{"type":"task_update","taskId":"T1","data":{"progress":42}}"#;
        let frame: Frame = serde_json::from_str(text).unwrap();
        assert_eq!(frame.frame_type, FrameType::TaskUpdate);
        assert_eq!(frame.task_id.as_deref(), Some("T1"));
        assert_eq!(frame.data["progress"], 42);
        assert_eq!(frame.timestamp, None);
    }

    #[test]
    fn test_unknown_frame_type_is_tolerated() {
        let text = r#"{"type":"task_paused","taskId":"T1"}"#;
        let frame: Frame = serde_json::from_str(text).unwrap();
        assert_eq!(frame.frame_type, FrameType::Unknown);
        assert_eq!(frame.task_id.as_deref(), Some("T1"));
    }

    #[test]
    fn test_heartbeat_response_parses_without_fields() {
        let frame: Frame = serde_json::from_str(r#"{"type":"heartbeat_response"}"#).unwrap();
        assert_eq!(frame.frame_type, FrameType::HeartbeatResponse);
        assert_eq!(frame.task_id, None);
    }
}
