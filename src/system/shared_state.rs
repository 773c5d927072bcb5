//! State shared between the processing thread and the sensor path.
//!
//! The retained-frame slot is the only resource both sides touch. The
//! processing loop replaces it after every frame; the auto-shutter reads it
//! under the same lock when a capture fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::camera::frame::QueuedFrame;

/// Outcome of a bounded read of the retained slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetainedAccess<R> {
    /// The lock was not acquired within the timeout.
    Busy,
    /// Nothing retained yet.
    Empty,
    Ready(R),
}

/// Most recently consumed frame, held until superseded.
#[derive(Debug, Default)]
pub struct RetainedFrame {
    slot: Mutex<Option<QueuedFrame>>,
}

impl RetainedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `frame`, releasing the previous one inside the critical section.
    pub fn replace(&self, frame: QueuedFrame) {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.replace(frame) {
            previous.release();
        }
    }

    /// Release the retained frame. Returns whether one was held.
    pub fn clear(&self) -> bool {
        let mut slot = self.slot.lock();
        match slot.take() {
            Some(frame) => {
                frame.release();
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Timestamp of the retained frame, if any.
    pub fn timestamp_ns(&self) -> Option<i64> {
        self.slot.lock().as_ref().map(QueuedFrame::timestamp_ns)
    }

    /// Run `f` on the retained frame while holding the lock, waiting at most
    /// `timeout` for it.
    pub fn with_frame<R>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&QueuedFrame) -> R,
    ) -> RetainedAccess<R> {
        let Some(slot) = self.slot.try_lock_for(timeout) else {
            return RetainedAccess::Busy;
        };
        match slot.as_ref() {
            Some(frame) => RetainedAccess::Ready(f(frame)),
            None => RetainedAccess::Empty,
        }
    }
}

/// Shared state accessible by the processing loop and the capture system.
#[derive(Debug, Default)]
pub struct SharedState {
    /// Latest frame seen by the processing loop.
    pub retained: RetainedFrame,

    /// Request the processing loop to stop consuming and exit.
    pub shutdown_requested: AtomicBool,

    /// Frames handed to the engine.
    pub frames_processed: AtomicU64,

    /// Frames the engine reported an error for.
    pub engine_failures: AtomicU64,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::SeqCst)
    }

    pub fn engine_failures(&self) -> u64 {
        self.engine_failures.load(Ordering::Relaxed)
    }
}
