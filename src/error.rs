//! Error taxonomy for the capture pipeline.
//!
//! Every class is recoverable at some level: open attempts can be retried,
//! per-frame and per-capture errors are logged and the pipeline keeps running.

use thiserror::Error;

/// Errors raised by the camera, frame and capture stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Capture permission is not granted. Terminal for this open attempt.
    #[error("camera permission not granted")]
    PermissionDenied,

    /// No camera, or the device was disconnected/errored. Reopen is permitted.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Session configuration failed, including the degraded single-output retry.
    #[error("capture session configuration failed: {0}")]
    SessionConfigFailed(String),

    /// A delivered frame could not be acquired or described; it was dropped.
    #[error("frame acquisition failed: {0}")]
    FrameAcquisition(String),

    /// Pixel planes of the retained frame could not be packed for a capture.
    #[error("buffer extraction failed: {0}")]
    BufferExtraction(String),

    /// The external engine reported a failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// A single backend call failed (stop repeating, close, ...).
    #[error("camera backend call failed: {0}")]
    Backend(String),
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
