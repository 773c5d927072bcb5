//! Consumer thread feeding frames to the tracking engine.

use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::engine::MappingEngine;

use super::frame_queue::FrameQueue;
use super::shared_state::SharedState;

/// Drains the frame queue into the engine and the retained slot.
pub struct FrameProcessingLoop {
    queue: Arc<FrameQueue>,
    engine: Arc<dyn MappingEngine>,
    shared: Arc<SharedState>,
}

impl FrameProcessingLoop {
    pub fn new(
        queue: Arc<FrameQueue>,
        engine: Arc<dyn MappingEngine>,
        shared: Arc<SharedState>,
    ) -> Self {
        Self {
            queue,
            engine,
            shared,
        }
    }

    /// Main loop. Returns once the queue is closed or shutdown is requested;
    /// on exit every remaining frame, including the retained one, is released.
    pub fn run(&mut self) {
        info!("Frame processing loop started");

        while !self.shared.is_shutdown_requested() {
            let Some(frame) = self.queue.take() else {
                break;
            };

            if let Err(e) = self.engine.process_frame(&frame.view()) {
                self.shared.engine_failures.fetch_add(1, Ordering::Relaxed);
                warn!(timestamp_ns = frame.timestamp_ns(), "Engine rejected frame: {}", e);
            }

            // Ownership moves into the slot; the superseded frame is released there.
            self.shared.retained.replace(frame);
            self.shared.frames_processed.fetch_add(1, Ordering::SeqCst);
        }

        let drained = self.queue.drain();
        let had_retained = self.shared.retained.clear();
        debug!(drained, had_retained, "Released remaining frames");
        info!(
            frames = self.shared.frames_processed(),
            engine_failures = self.shared.engine_failures(),
            "Frame processing loop stopped"
        );
    }
}

/// Spawn the processing loop on a dedicated named thread.
pub fn spawn_processing_loop(
    queue: Arc<FrameQueue>,
    engine: Arc<dyn MappingEngine>,
    shared: Arc<SharedState>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("frame-processing".to_string())
        .spawn(move || {
            let mut processing = FrameProcessingLoop::new(queue, engine, shared);
            processing.run();
        })
}
