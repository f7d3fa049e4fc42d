use crate::channel::ClientState;
use crate::messaging::{Frame, FrameType};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Routes incoming frames to appropriate handlers
pub struct FrameRouter {
    state: Arc<RwLock<ClientState>>,
}

impl FrameRouter {
    pub fn new(state: Arc<RwLock<ClientState>>) -> Self {
        Self { state }
    }

    /// Parses raw wire text and routes the frame.
    ///
    /// Malformed payloads are dropped and logged, never propagated.
    pub async fn route_text(&self, text: &str) {
        match serde_json::from_str::<Frame>(text) {
            Ok(frame) => self.route(frame).await,
            Err(e) => {
                tracing::warn!("dropping malformed frame: {} - raw: {}", e, text);
            }
        }
    }

    /// Routes one parsed frame to the appropriate handler(s)
    pub async fn route(&self, frame: Frame) {
        if frame.frame_type == FrameType::HeartbeatResponse {
            self.handle_heartbeat_ack().await;
            return;
        }

        if let Some(task_id) = frame.task_id.clone() {
            self.dispatch_to_subscribers(&task_id, &frame).await;
            return;
        }

        // Unrecognized frame types without a task id are ignored for
        // forward compatibility.
        tracing::debug!(frame_type = %frame.frame_type, "ignoring unhandled frame");
    }

    /// Clears the pending probe so the heartbeat monitor sees the ack
    async fn handle_heartbeat_ack(&self) {
        let mut state = self.state.write().await;
        if state.pending_probe.take().is_some() {
            tracing::debug!("received heartbeat ack");
        }
    }

    /// Fans the frame out to every callback registered for the task id.
    ///
    /// Each callback runs in isolation: one panicking subscriber cannot
    /// prevent delivery to its siblings or to subsequent frames.
    async fn dispatch_to_subscribers(&self, task_id: &str, frame: &Frame) {
        let callbacks = {
            let state = self.state.read().await;
            state.registry.callbacks_for(task_id)
        };

        if callbacks.is_empty() {
            tracing::debug!(task_id, frame_type = %frame.frame_type, "no subscribers for frame");
            return;
        }

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(frame))).is_err() {
                tracing::error!(task_id, "subscriber callback panicked during dispatch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::TaskCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn state() -> Arc<RwLock<ClientState>> {
        Arc::new(RwLock::new(ClientState::new()))
    }

    fn counting_callback(counter: Arc<AtomicUsize>) -> TaskCallback {
        Arc::new(move |_frame: &Frame| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let state = state();
        let router = FrameRouter::new(Arc::clone(&state));
        router.route_text("{not valid json").await;
        router.route_text(r#"{"taskId":"T1"}"#).await;
        // Nothing to assert beyond "no panic, no state change"
        assert!(state.read().await.pending_probe.is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_response_clears_pending_probe() {
        let state = state();
        state.write().await.pending_probe = Some(Instant::now());

        let router = FrameRouter::new(Arc::clone(&state));
        router.route_text(r#"{"type":"heartbeat_response"}"#).await;

        assert!(state.read().await.pending_probe.is_none());
    }

    #[tokio::test]
    async fn test_task_frame_reaches_all_subscribers() {
        let state = state();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        {
            let mut guard = state.write().await;
            guard.registry.add("T1", counting_callback(Arc::clone(&first)));
            guard.registry.add("T1", counting_callback(Arc::clone(&second)));
            guard.registry.add("T2", counting_callback(Arc::new(AtomicUsize::new(0))));
        }

        let router = FrameRouter::new(Arc::clone(&state));
        router
            .route_text(r#"{"type":"task_update","taskId":"T1","data":{"progress":10}}"#)
            .await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_starve_siblings() {
        let state = state();
        let delivered = Arc::new(AtomicUsize::new(0));
        {
            let mut guard = state.write().await;
            guard
                .registry
                .add("T1", Arc::new(|_frame: &Frame| panic!("subscriber bug")));
            guard
                .registry
                .add("T1", counting_callback(Arc::clone(&delivered)));
        }

        let router = FrameRouter::new(Arc::clone(&state));
        router
            .route_text(r#"{"type":"task_error","taskId":"T1","data":{"error":"boom"}}"#)
            .await;
        router
            .route_text(r#"{"type":"task_complete","taskId":"T1","data":{"result":"ok"}}"#)
            .await;

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_type_with_task_id_still_dispatches() {
        let state = state();
        let delivered = Arc::new(AtomicUsize::new(0));
        state
            .write()
            .await
            .registry
            .add("T1", counting_callback(Arc::clone(&delivered)));

        let router = FrameRouter::new(Arc::clone(&state));
        router
            .route_text(r#"{"type":"task_paused","taskId":"T1"}"#)
            .await;

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_frame_for_unsubscribed_task_has_no_effect() {
        let state = state();
        let router = FrameRouter::new(Arc::clone(&state));
        router
            .route_text(r#"{"type":"task_update","taskId":"ghost","data":{"progress":1}}"#)
            .await;
        // No subscribers, nothing happens
        assert!(state.read().await.registry.is_empty());
    }
}
