//! Bounded frame handoff with drop-oldest backpressure.
//!
//! The camera delivery thread is the only producer and the processing loop
//! the only consumer. When the queue is full the oldest frame is evicted and
//! released before the new one is admitted, so capacity is never exceeded
//! and frames are never leaked.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::camera::frame::QueuedFrame;

/// Evict/insert rounds before a contended enqueue gives up on its frame.
const MAX_ENQUEUE_ATTEMPTS: usize = 4;

/// Result of [`FrameQueue::try_enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Admitted without eviction.
    Admitted,
    /// Admitted after the oldest frame was evicted and released.
    AdmittedAfterEviction,
    /// Could not be admitted under contention; the frame was released.
    Dropped,
    /// Queue closed; the frame was released.
    Closed,
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub admitted: u64,
    pub evicted: u64,
    pub dropped: u64,
    pub taken: u64,
    pub drained: u64,
}

#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    evicted: AtomicU64,
    dropped: AtomicU64,
    taken: AtomicU64,
    drained: AtomicU64,
}

pub struct FrameQueue {
    sender: Sender<QueuedFrame>,
    receiver: Receiver<QueuedFrame>,
    /// Dropped on close; wakes a consumer blocked in `take`.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
    capacity: usize,
    counters: Counters,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        let (shutdown_tx, shutdown_rx) = bounded(0);
        Self {
            sender,
            receiver,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            closed: AtomicBool::new(false),
            capacity,
            counters: Counters::default(),
        }
    }

    /// Offer a frame, evicting the oldest queued frame if full.
    pub fn try_enqueue(&self, frame: QueuedFrame) -> EnqueueOutcome {
        if self.is_closed() {
            frame.release();
            return EnqueueOutcome::Closed;
        }

        let mut frame = frame;
        let mut evicted = false;
        for _ in 0..MAX_ENQUEUE_ATTEMPTS {
            match self.sender.try_send(frame) {
                Ok(()) => return self.admitted(evicted),
                Err(TrySendError::Full(rejected)) => {
                    // The consumer may have freed a slot since the refusal.
                    frame = match self.sender.try_send(rejected) {
                        Ok(()) => return self.admitted(evicted),
                        Err(TrySendError::Full(rejected)) => rejected,
                        Err(TrySendError::Disconnected(rejected)) => {
                            rejected.release();
                            return EnqueueOutcome::Closed;
                        }
                    };
                    if let Ok(oldest) = self.receiver.try_recv() {
                        debug!(
                            timestamp_ns = oldest.timestamp_ns(),
                            "Frame queue full, evicting oldest frame"
                        );
                        oldest.release();
                        self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                        evicted = true;
                    }
                }
                Err(TrySendError::Disconnected(rejected)) => {
                    rejected.release();
                    return EnqueueOutcome::Closed;
                }
            }
        }

        warn!(
            timestamp_ns = frame.timestamp_ns(),
            "Frame queue contended, dropping frame"
        );
        frame.release();
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        EnqueueOutcome::Dropped
    }

    fn admitted(&self, evicted: bool) -> EnqueueOutcome {
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        if evicted {
            EnqueueOutcome::AdmittedAfterEviction
        } else {
            EnqueueOutcome::Admitted
        }
    }

    /// Block until a frame arrives, in arrival order. Returns `None` once the
    /// queue is closed; frames still queued then are left for [`drain`](Self::drain).
    pub fn take(&self) -> Option<QueuedFrame> {
        if self.is_closed() {
            return None;
        }
        let frame = select! {
            recv(self.receiver) -> msg => msg.ok(),
            recv(self.shutdown_rx) -> _ => None,
        };
        if frame.is_some() {
            self.counters.taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Non-blocking pop.
    pub fn try_take(&self) -> Option<QueuedFrame> {
        let frame = self.receiver.try_recv().ok();
        if frame.is_some() {
            self.counters.taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Stop accepting frames and wake a blocked consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown_tx.lock().take();
    }

    /// Release every queued frame. Returns how many were released.
    pub fn drain(&self) -> usize {
        let mut released = 0;
        while let Ok(frame) = self.receiver.try_recv() {
            frame.release();
            released += 1;
        }
        self.counters
            .drained
            .fetch_add(released as u64, Ordering::Relaxed);
        released
    }

    /// Check if the queue was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Maximum number of queued frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the lifetime counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            taken: self.counters.taken.load(Ordering::Relaxed),
            drained: self.counters.drained.load(Ordering::Relaxed),
        }
    }
}

impl Drop for FrameQueue {
    fn drop(&mut self) {
        self.drain();
    }
}
