//! Platform camera abstraction.
//!
//! The session talks to the platform only through these traits, so the
//! device, session and reader handles it owns are plain boxed trait objects
//! that are closed explicitly during teardown.

use std::fmt;

use serde::Deserialize;

use crate::camera::image::ImageBuffer;
use crate::error::CaptureResult;

/// Stream resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width over height; zero for a degenerate size.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format family of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFormat {
    /// Multi-plane YUV 4:2:0, fed to tracking and the mosaic.
    Planar,
    /// Compressed stills (JPEG).
    Compressed,
}

/// Identifies a reader's output surface within a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u32);

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "out{}", self.0)
    }
}

/// Requested reader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub size: Size,
    pub format: StreamFormat,
    pub max_images: usize,
}

/// Template for a capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
}

/// A (repeating) capture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<OutputId>,
    pub auto_exposure: bool,
    pub continuous_autofocus: bool,
}

impl CaptureRequest {
    /// Preview request with automatic exposure and continuous focus.
    pub fn preview(target: OutputId) -> Self {
        Self {
            template: RequestTemplate::Preview,
            targets: vec![target],
            auto_exposure: true,
            continuous_autofocus: true,
        }
    }
}

/// Asynchronous device notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Disconnected,
    Error(i32),
}

/// Invoked on the platform delivery thread for every frame a reader produces.
/// The callee takes ownership and must release the image.
pub type FrameCallback = Box<dyn FnMut(Box<dyn ImageBuffer>) + Send>;

/// Entry point to the platform camera service.
pub trait CameraBackend: Send {
    /// Available camera ids, rear-facing first.
    fn camera_ids(&self) -> CaptureResult<Vec<String>>;

    /// Output sizes the camera supports for a format.
    fn output_sizes(&self, camera_id: &str, format: StreamFormat) -> CaptureResult<Vec<Size>>;

    /// Whether the capture permission is currently granted.
    fn has_permission(&self) -> bool;

    /// Create a reader that delivers frames of `spec` to `on_frame`.
    fn create_reader(
        &mut self,
        spec: OutputSpec,
        on_frame: FrameCallback,
    ) -> CaptureResult<Box<dyn StreamReader>>;

    /// Acquire the device handle.
    fn open_device(&mut self, camera_id: &str) -> CaptureResult<Box<dyn CameraDevice>>;
}

/// An open camera device.
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    fn create_session(&mut self, outputs: &[OutputId])
    -> CaptureResult<Box<dyn CaptureSession>>;

    fn close(&mut self) -> CaptureResult<()>;
}

/// A configured capture session on a device.
pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> CaptureResult<()>;

    fn stop_repeating(&mut self) -> CaptureResult<()>;

    fn close(&mut self) -> CaptureResult<()>;
}

/// A frame reader bound to one output surface.
pub trait StreamReader: Send {
    fn output(&self) -> OutputId;

    fn spec(&self) -> OutputSpec;

    fn close(&mut self) -> CaptureResult<()>;
}
