//! Camera session lifecycle states.

/// State of the camera session. Only [`CameraSession`](super::CameraSession)
/// moves between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSessionState {
    /// No device held.
    Closed,
    /// Negotiating streams and acquiring the device.
    Opening,
    /// Device held, no capture session yet.
    Open,
    /// Creating the capture session.
    Configuring,
    /// Repeating request running; frames flow.
    Streaming,
    /// Configuration failed terminally for this attempt.
    Failed,
}

impl CaptureSessionState {
    /// States in which `open()` is a no-op.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Opening | Self::Open | Self::Configuring | Self::Streaming
        )
    }
}

impl Default for CaptureSessionState {
    fn default() -> Self {
        Self::Closed
    }
}
