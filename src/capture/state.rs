//! Auto-shutter and application mode states.

/// Progress of a guided scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterState {
    /// No scan in progress.
    Idle,
    /// Capturing targets as the device is pointed at them.
    Scanning,
    /// Every target captured, or the user finished early. Stitching pending.
    Complete,
}

impl Default for ShutterState {
    fn default() -> Self {
        Self::Idle
    }
}

/// What the pipeline is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Guided photosphere capture; the auto-shutter is active.
    Creation,
    /// Plain tracking against the current map.
    Tracking,
}

impl CaptureMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Creation => Self::Tracking,
            Self::Tracking => Self::Creation,
        }
    }
}

impl Default for CaptureMode {
    fn default() -> Self {
        Self::Creation
    }
}
