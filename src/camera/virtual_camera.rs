//! Scriptable in-process camera backend.
//!
//! `VirtualCamera` implements the backend traits without hardware. Clones
//! share one state, so a test can hand one clone to a session and keep
//! another to inject failures, deliver frames and inspect the call journal.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::camera::backend::{
    CameraBackend, CameraDevice, CaptureRequest, CaptureSession, FrameCallback, OutputId,
    OutputSpec, Size, StreamFormat, StreamReader,
};
use crate::camera::image::{ImageBuffer, OwnedImage};
use crate::error::{CaptureError, CaptureResult};

/// When session creation is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    Never,
    /// Reject sessions with more than one output.
    MultiOutput,
    Always,
}

/// Journal entry for every call the backend receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraCall {
    CreateReader {
        output: OutputId,
        format: StreamFormat,
        size: Size,
    },
    OpenDevice(String),
    CreateSession(Vec<OutputId>),
    SetRepeating(CaptureRequest),
    StopRepeating,
    CloseSession,
    CloseDevice,
    CloseReader(OutputId),
}

type SharedCallback = Arc<Mutex<FrameCallback>>;

struct Inner {
    camera_ids: Vec<String>,
    planar_sizes: Vec<Size>,
    compressed_sizes: Vec<Size>,
    permission: bool,
    session_failure: SessionFailure,
    fail_open: bool,
    fail_repeating: bool,
    fail_stop_repeating: bool,
    fail_session_close: bool,
    fail_device_close: bool,
    journal: Vec<CameraCall>,
    next_output: u32,
    sinks: HashMap<OutputId, (OutputSpec, SharedCallback)>,
    open_devices: usize,
    repeating: Option<OutputId>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            camera_ids: vec!["0".to_string()],
            planar_sizes: vec![
                Size::new(640, 480),
                Size::new(1280, 720),
                Size::new(1920, 1080),
                Size::new(4032, 3024),
            ],
            compressed_sizes: vec![
                Size::new(1920, 1080),
                Size::new(3840, 2160),
                Size::new(4032, 3024),
                Size::new(8000, 6000),
            ],
            permission: true,
            session_failure: SessionFailure::Never,
            fail_open: false,
            fail_repeating: false,
            fail_stop_repeating: false,
            fail_session_close: false,
            fail_device_close: false,
            journal: Vec::new(),
            next_output: 0,
            sinks: HashMap::new(),
            open_devices: 0,
            repeating: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct VirtualCamera {
    inner: Arc<Mutex<Inner>>,
}

impl VirtualCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_camera_ids(&self, ids: Vec<String>) {
        self.inner.lock().camera_ids = ids;
    }

    pub fn set_sizes(&self, format: StreamFormat, sizes: Vec<Size>) {
        let mut inner = self.inner.lock();
        match format {
            StreamFormat::Planar => inner.planar_sizes = sizes,
            StreamFormat::Compressed => inner.compressed_sizes = sizes,
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.inner.lock().permission = granted;
    }

    pub fn set_session_failure(&self, failure: SessionFailure) {
        self.inner.lock().session_failure = failure;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.inner.lock().fail_open = fail;
    }

    pub fn set_fail_repeating(&self, fail: bool) {
        self.inner.lock().fail_repeating = fail;
    }

    pub fn set_fail_stop_repeating(&self, fail: bool) {
        self.inner.lock().fail_stop_repeating = fail;
    }

    pub fn set_fail_session_close(&self, fail: bool) {
        self.inner.lock().fail_session_close = fail;
    }

    pub fn set_fail_device_close(&self, fail: bool) {
        self.inner.lock().fail_device_close = fail;
    }

    pub fn journal(&self) -> Vec<CameraCall> {
        self.inner.lock().journal.clone()
    }

    /// Device handles opened and not yet closed.
    pub fn open_devices(&self) -> usize {
        self.inner.lock().open_devices
    }

    /// Readers created and not yet closed.
    pub fn reader_count(&self) -> usize {
        self.inner.lock().sinks.len()
    }

    /// Output targeted by the running repeating request.
    pub fn repeating_target(&self) -> Option<OutputId> {
        self.inner.lock().repeating
    }

    /// Spec of the output the repeating request targets.
    pub fn streaming_spec(&self) -> Option<OutputSpec> {
        let inner = self.inner.lock();
        inner
            .repeating
            .and_then(|output| inner.sinks.get(&output).map(|(spec, _)| *spec))
    }

    /// Deliver `image` to the output of the repeating request. Without one the
    /// image is released and `false` returned.
    pub fn deliver_frame(&self, image: Box<dyn ImageBuffer>) -> bool {
        let target = self.inner.lock().repeating;
        match target {
            Some(output) => self.deliver_to(output, image),
            None => {
                let mut image = image;
                image.close();
                false
            }
        }
    }

    /// Deliver `image` to a specific reader, as the platform would.
    pub fn deliver_to(&self, output: OutputId, mut image: Box<dyn ImageBuffer>) -> bool {
        // Callbacks run without the backend lock held.
        let callback = self.inner.lock().sinks.get(&output).map(|(_, cb)| Arc::clone(cb));
        match callback {
            Some(callback) => {
                let mut on_frame = callback.lock();
                (*on_frame)(image);
                true
            }
            None => {
                image.close();
                false
            }
        }
    }

    /// Generate synthetic YUV frames every `interval` while a repeating
    /// request is running.
    pub fn start_pump(&self, interval: Duration) -> io::Result<FramePump> {
        let camera = self.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("virtual-camera".to_string())
            .spawn(move || {
                let started = Instant::now();
                let mut sequence: u64 = 0;
                while !stop_flag.load(Ordering::Acquire) {
                    if let Some(spec) = camera.streaming_spec() {
                        let timestamp_ns = started.elapsed().as_nanos() as i64;
                        let luma = (sequence % 256) as u8;
                        let image = OwnedImage::yuv420(
                            spec.size.width,
                            spec.size.height,
                            timestamp_ns,
                            luma,
                            128,
                            128,
                        );
                        camera.deliver_frame(Box::new(image));
                        sequence += 1;
                    }
                    thread::sleep(interval);
                }
                debug!(frames = sequence, "Virtual camera pump stopped");
            })?;

        Ok(FramePump {
            stop,
            handle: Some(handle),
        })
    }

    fn record(&self, call: CameraCall) {
        self.inner.lock().journal.push(call);
    }
}

impl CameraBackend for VirtualCamera {
    fn camera_ids(&self) -> CaptureResult<Vec<String>> {
        Ok(self.inner.lock().camera_ids.clone())
    }

    fn output_sizes(&self, camera_id: &str, format: StreamFormat) -> CaptureResult<Vec<Size>> {
        let inner = self.inner.lock();
        if !inner.camera_ids.iter().any(|id| id == camera_id) {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unknown camera {}",
                camera_id
            )));
        }
        Ok(match format {
            StreamFormat::Planar => inner.planar_sizes.clone(),
            StreamFormat::Compressed => inner.compressed_sizes.clone(),
        })
    }

    fn has_permission(&self) -> bool {
        self.inner.lock().permission
    }

    fn create_reader(
        &mut self,
        spec: OutputSpec,
        on_frame: FrameCallback,
    ) -> CaptureResult<Box<dyn StreamReader>> {
        let mut inner = self.inner.lock();
        let output = OutputId(inner.next_output);
        inner.next_output += 1;
        inner
            .sinks
            .insert(output, (spec, Arc::new(Mutex::new(on_frame))));
        inner.journal.push(CameraCall::CreateReader {
            output,
            format: spec.format,
            size: spec.size,
        });
        Ok(Box::new(VirtualReader {
            camera: self.clone(),
            output,
            spec,
        }))
    }

    fn open_device(&mut self, camera_id: &str) -> CaptureResult<Box<dyn CameraDevice>> {
        let mut inner = self.inner.lock();
        inner.journal.push(CameraCall::OpenDevice(camera_id.to_string()));
        if inner.fail_open {
            return Err(CaptureError::DeviceUnavailable(format!(
                "camera {} in use",
                camera_id
            )));
        }
        inner.open_devices += 1;
        Ok(Box::new(VirtualDevice {
            camera: self.clone(),
            id: camera_id.to_string(),
        }))
    }
}

struct VirtualDevice {
    camera: VirtualCamera,
    id: String,
}

impl CameraDevice for VirtualDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_session(
        &mut self,
        outputs: &[OutputId],
    ) -> CaptureResult<Box<dyn CaptureSession>> {
        let mut inner = self.camera.inner.lock();
        inner.journal.push(CameraCall::CreateSession(outputs.to_vec()));
        let rejected = match inner.session_failure {
            SessionFailure::Never => false,
            SessionFailure::MultiOutput => outputs.len() > 1,
            SessionFailure::Always => true,
        };
        if rejected {
            return Err(CaptureError::SessionConfigFailed(format!(
                "virtual camera rejected {} output(s)",
                outputs.len()
            )));
        }
        Ok(Box::new(VirtualSession {
            camera: self.camera.clone(),
        }))
    }

    fn close(&mut self) -> CaptureResult<()> {
        let mut inner = self.camera.inner.lock();
        inner.journal.push(CameraCall::CloseDevice);
        inner.open_devices = inner.open_devices.saturating_sub(1);
        inner.repeating = None;
        if inner.fail_device_close {
            return Err(CaptureError::Backend("device close failed".to_string()));
        }
        Ok(())
    }
}

struct VirtualSession {
    camera: VirtualCamera,
}

impl CaptureSession for VirtualSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> CaptureResult<()> {
        let mut inner = self.camera.inner.lock();
        inner.journal.push(CameraCall::SetRepeating(request.clone()));
        if inner.fail_repeating {
            return Err(CaptureError::Backend("repeating request rejected".to_string()));
        }
        inner.repeating = request.targets.first().copied();
        Ok(())
    }

    fn stop_repeating(&mut self) -> CaptureResult<()> {
        let mut inner = self.camera.inner.lock();
        inner.journal.push(CameraCall::StopRepeating);
        if inner.fail_stop_repeating {
            return Err(CaptureError::Backend("stop repeating failed".to_string()));
        }
        inner.repeating = None;
        Ok(())
    }

    fn close(&mut self) -> CaptureResult<()> {
        let mut inner = self.camera.inner.lock();
        inner.journal.push(CameraCall::CloseSession);
        inner.repeating = None;
        if inner.fail_session_close {
            return Err(CaptureError::Backend("session close failed".to_string()));
        }
        Ok(())
    }
}

struct VirtualReader {
    camera: VirtualCamera,
    output: OutputId,
    spec: OutputSpec,
}

impl StreamReader for VirtualReader {
    fn output(&self) -> OutputId {
        self.output
    }

    fn spec(&self) -> OutputSpec {
        self.spec
    }

    fn close(&mut self) -> CaptureResult<()> {
        let removed = {
            let mut inner = self.camera.inner.lock();
            inner.journal.push(CameraCall::CloseReader(self.output));
            inner.sinks.remove(&self.output)
        };
        // Drop the callback outside the backend lock.
        drop(removed);
        Ok(())
    }
}

/// Background frame generator started by [`VirtualCamera::start_pump`].
pub struct FramePump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FramePump {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_frames_go_to_repeating_output() {
        let mut camera = VirtualCamera::new();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        let spec = OutputSpec {
            size: Size::new(4, 2),
            format: StreamFormat::Planar,
            max_images: 2,
        };
        let reader = camera
            .create_reader(
                spec,
                Box::new(move |mut image| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    image.close();
                }),
            )
            .unwrap();

        assert!(!camera.deliver_frame(Box::new(OwnedImage::yuv420(4, 2, 0, 0, 0, 0))));

        let mut device = camera.open_device("0").unwrap();
        let mut session = device.create_session(&[reader.output()]).unwrap();
        session
            .set_repeating_request(&CaptureRequest::preview(reader.output()))
            .unwrap();

        assert!(camera.deliver_frame(Box::new(OwnedImage::yuv420(4, 2, 1, 0, 0, 0))));
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(camera.streaming_spec(), Some(spec));
    }

    #[test]
    fn test_multi_output_failure_mode() {
        let mut camera = VirtualCamera::new();
        camera.set_session_failure(SessionFailure::MultiOutput);
        let mut device = camera.open_device("0").unwrap();

        assert!(device.create_session(&[OutputId(0), OutputId(1)]).is_err());
        assert!(device.create_session(&[OutputId(0)]).is_ok());
    }

    #[test]
    fn test_device_count_tracks_close() {
        let mut camera = VirtualCamera::new();
        let mut device = camera.open_device("0").unwrap();
        assert_eq!(camera.open_devices(), 1);

        camera.set_fail_device_close(true);
        assert!(device.close().is_err());
        assert_eq!(camera.open_devices(), 0);
    }

    #[test]
    fn test_unknown_camera_has_no_sizes() {
        let camera = VirtualCamera::new();
        assert!(camera.output_sizes("7", StreamFormat::Planar).is_err());
    }
}
