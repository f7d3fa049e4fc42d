use crate::messaging::Frame;
use crate::types::constants::MAX_QUEUE_SIZE;
use std::collections::VecDeque;

/// FIFO buffer of frames awaiting transmission.
///
/// Bounded so a long offline stretch cannot grow memory without limit; on
/// overflow the oldest frame is dropped with a warning.
pub struct OutboundQueue {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::with_capacity(MAX_QUEUE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity,
        }
    }

    pub fn enqueue(&mut self, frame: Frame) {
        if self.frames.len() >= self.capacity {
            let dropped = self.frames.pop_front();
            tracing::warn!(
                dropped = dropped.map(|f| f.frame_type.to_string()).unwrap_or_default(),
                "outbound queue full, dropping oldest frame"
            );
        }
        self.frames.push_back(frame);
    }

    /// Next frame in arrival order.
    pub fn pop_front(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Returns a frame that failed to transmit mid-flush so it stays first in line.
    pub fn push_front(&mut self, frame: Frame) {
        self.frames.push_front(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
