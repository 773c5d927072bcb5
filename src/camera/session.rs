//! Camera session lifecycle.
//!
//! `CameraSession` exclusively owns the device handle, the capture session
//! and the stream readers. Planar frames are wrapped as [`QueuedFrame`]s on
//! the delivery thread and pushed into the shared [`FrameQueue`]; frames of
//! the compressed stream are released as soon as they arrive.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::camera::backend::{
    CameraBackend, CameraDevice, CaptureRequest, CaptureSession, DeviceEvent, FrameCallback,
    OutputId, OutputSpec, Size, StreamFormat, StreamReader,
};
use crate::camera::frame::QueuedFrame;
use crate::camera::negotiation::choose_optimal_size;
use crate::camera::state::CaptureSessionState;
use crate::config::CameraConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::system::events::{EventBus, PipelineEvent};
use crate::system::frame_queue::FrameQueue;

/// Stream sizes chosen by the last successful negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedStreams {
    pub primary: Size,
    pub compressed: Option<Size>,
}

pub struct CameraSession {
    backend: Box<dyn CameraBackend>,
    config: CameraConfig,
    queue: Arc<FrameQueue>,
    events: EventBus,
    state: CaptureSessionState,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    readers: Vec<Box<dyn StreamReader>>,
    streams: Option<NegotiatedStreams>,
}

impl CameraSession {
    pub fn new(
        backend: Box<dyn CameraBackend>,
        config: CameraConfig,
        queue: Arc<FrameQueue>,
        events: EventBus,
    ) -> Self {
        Self {
            backend,
            config,
            queue,
            events,
            state: CaptureSessionState::Closed,
            device: None,
            session: None,
            readers: Vec::new(),
            streams: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaptureSessionState {
        self.state
    }

    /// Stream sizes of the current session, if one was negotiated.
    pub fn negotiated_streams(&self) -> Option<NegotiatedStreams> {
        self.streams
    }

    /// Check if a device handle is held.
    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Negotiate streams, acquire the device and start streaming.
    ///
    /// No-op while a session is already opening or running. On failure every
    /// handle acquired so far is released; a configuration failure leaves the
    /// session `Failed`, anything else leaves it `Closed`.
    pub fn open(&mut self) -> CaptureResult<()> {
        if self.state.is_active() {
            debug!(state = ?self.state, "Camera already open");
            return Ok(());
        }

        self.set_state(CaptureSessionState::Opening);
        if let Err(e) = self.try_open() {
            warn!(error = %e, "Failed to open camera");
            self.teardown();
            self.streams = None;
            let state = match e {
                CaptureError::SessionConfigFailed(_) => CaptureSessionState::Failed,
                _ => CaptureSessionState::Closed,
            };
            self.set_state(state);
            return Err(e);
        }
        Ok(())
    }

    fn try_open(&mut self) -> CaptureResult<()> {
        let camera_id = self
            .backend
            .camera_ids()?
            .into_iter()
            .next()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no camera available".to_string()))?;

        let streams = self.negotiate(&camera_id)?;

        if !self.backend.has_permission() {
            return Err(CaptureError::PermissionDenied);
        }

        let mut outputs = Vec::with_capacity(2);
        let sink = self.planar_sink();
        let primary = self.backend.create_reader(
            OutputSpec {
                size: streams.primary,
                format: StreamFormat::Planar,
                max_images: self.config.max_images,
            },
            sink,
        )?;
        outputs.push(primary.output());
        self.readers.push(primary);

        let mut compressed = None;
        if let Some(size) = streams.compressed {
            let spec = OutputSpec {
                size,
                format: StreamFormat::Compressed,
                max_images: self.config.compressed_max_images,
            };
            // Frames from this stream are not consumed yet; release on arrival.
            let drain: FrameCallback = Box::new(|mut image| image.close());
            match self.backend.create_reader(spec, drain) {
                Ok(reader) => {
                    outputs.push(reader.output());
                    self.readers.push(reader);
                    compressed = Some(size);
                }
                Err(e) => warn!(error = %e, "Compressed stream unavailable, continuing without it"),
            }
        }

        let streams = NegotiatedStreams {
            primary: streams.primary,
            compressed,
        };
        self.streams = Some(streams);
        info!(
            camera = %camera_id,
            primary = %streams.primary,
            compressed = ?streams.compressed.map(|s| s.to_string()),
            "Streams negotiated"
        );
        self.events.publish(PipelineEvent::StreamsNegotiated {
            primary: streams.primary,
            compressed: streams.compressed,
        });

        let device = self
            .backend
            .open_device(&camera_id)
            .map_err(|e| match e {
                CaptureError::PermissionDenied | CaptureError::DeviceUnavailable(_) => e,
                other => CaptureError::DeviceUnavailable(other.to_string()),
            })?;
        self.device = Some(device);
        self.set_state(CaptureSessionState::Open);

        self.configure_session(&outputs)
    }

    fn negotiate(&self, camera_id: &str) -> CaptureResult<NegotiatedStreams> {
        let planar = self.backend.output_sizes(camera_id, StreamFormat::Planar)?;
        let primary = choose_optimal_size(&planar, self.config.target_size, None).ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("camera {} has no planar sizes", camera_id))
        })?;

        let compressed = if self.config.enable_compressed_stream {
            match self.backend.output_sizes(camera_id, StreamFormat::Compressed) {
                Ok(sizes) => choose_optimal_size(
                    &sizes,
                    self.config.compressed_target_size,
                    Some(self.config.max_compressed_pixels),
                ),
                Err(e) => {
                    warn!(error = %e, "Could not query compressed sizes");
                    None
                }
            }
        } else {
            None
        };

        Ok(NegotiatedStreams {
            primary,
            compressed,
        })
    }

    /// Frame callback for the primary stream. Runs on the delivery thread.
    fn planar_sink(&self) -> FrameCallback {
        let queue = Arc::clone(&self.queue);
        Box::new(move |image| match QueuedFrame::from_image(image) {
            Ok(frame) => {
                queue.try_enqueue(frame);
            }
            Err(e) => warn!(error = %e, "Dropping frame"),
        })
    }

    /// Create a capture session over `outputs` and start the repeating
    /// request on the first one.
    ///
    /// A running session is stopped and closed first. A multi-output
    /// failure is retried once with the first output alone. If that fails
    /// too the session is `Failed` and the device released.
    fn configure_session(&mut self, outputs: &[OutputId]) -> CaptureResult<()> {
        let Some(&primary) = outputs.first() else {
            return Err(CaptureError::SessionConfigFailed("no outputs".to_string()));
        };
        self.release_session();
        let Some(device) = self.device.as_mut() else {
            return Err(CaptureError::DeviceUnavailable("no open device".to_string()));
        };

        self.state = CaptureSessionState::Configuring;
        self.events
            .publish(PipelineEvent::SessionStateChanged(CaptureSessionState::Configuring));

        let created = match device.create_session(outputs) {
            Ok(session) => Ok(session),
            Err(e) if outputs.len() > 1 => {
                warn!(
                    error = %e,
                    outputs = outputs.len(),
                    "Session configuration failed, retrying with the primary output only"
                );
                device.create_session(&[primary])
            }
            Err(e) => Err(e),
        };

        let result = created.map_err(as_config_failure).and_then(|mut session| {
            match session.set_repeating_request(&CaptureRequest::preview(primary)) {
                Ok(()) => Ok(session),
                Err(e) => {
                    if let Err(close_err) = session.close() {
                        warn!(error = %close_err, "Failed to close rejected session");
                    }
                    Err(as_config_failure(e))
                }
            }
        });

        match result {
            Ok(session) => {
                self.session = Some(session);
                self.set_state(CaptureSessionState::Streaming);
                info!(output = %primary, "Camera streaming");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Capture session configuration failed");
                self.teardown();
                self.set_state(CaptureSessionState::Failed);
                Err(e)
            }
        }
    }

    /// Stop streaming and release every handle. Safe to call repeatedly.
    pub fn close(&mut self) {
        let holds_anything =
            self.session.is_some() || self.device.is_some() || !self.readers.is_empty();
        if !holds_anything && self.state == CaptureSessionState::Closed {
            return;
        }
        self.teardown();
        self.streams = None;
        self.set_state(CaptureSessionState::Closed);
        info!("Camera closed");
    }

    /// React to an asynchronous device notification.
    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        warn!(?event, "Camera device lost");
        self.teardown();
        self.streams = None;
        self.set_state(CaptureSessionState::Closed);
    }

    /// Best-effort release in a fixed order: stop repeating, close session,
    /// close device, close readers. A failing step never skips the rest.
    fn teardown(&mut self) {
        self.release_session();
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.close() {
                warn!(error = %e, device = device.id(), "Failed to close camera device");
            }
        }
        for mut reader in self.readers.drain(..) {
            if let Err(e) = reader.close() {
                warn!(error = %e, output = %reader.output(), "Failed to close stream reader");
            }
        }
    }

    fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop_repeating() {
                warn!(error = %e, "Failed to stop repeating request");
            }
            if let Err(e) = session.close() {
                warn!(error = %e, "Failed to close capture session");
            }
        }
    }

    fn set_state(&mut self, state: CaptureSessionState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "Camera session state change");
        self.state = state;
        self.events.publish(PipelineEvent::SessionStateChanged(state));
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn as_config_failure(e: CaptureError) -> CaptureError {
    match e {
        CaptureError::SessionConfigFailed(_) => e,
        other => CaptureError::SessionConfigFailed(other.to_string()),
    }
}
