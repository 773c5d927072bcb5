//! Pipeline orchestration and thread management.
//!
//! This module contains the top-level `CaptureSystem`, which spawns the frame
//! processing thread, along with the frame queue, the shared retained-frame
//! state and the pipeline event bus.

mod capture_system;
pub mod events;
pub mod frame_queue;
pub mod processing_loop;
pub mod shared_state;

pub use capture_system::{ActionOutcome, CaptureSystem};
pub use events::{
    DEFAULT_EVENT_LOG_CAPACITY, EventBus, EventLog, EventObserver, LoggedEvent, PipelineEvent,
};
pub use frame_queue::{EnqueueOutcome, FrameQueue, QueueStats};
pub use processing_loop::{FrameProcessingLoop, spawn_processing_loop};
pub use shared_state::{RetainedAccess, RetainedFrame, SharedState};
