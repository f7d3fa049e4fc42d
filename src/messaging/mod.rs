mod frame;
mod router;

pub use frame::{Frame, FrameType, now_ms};
pub use router::FrameRouter;
