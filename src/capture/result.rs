//! Outcomes of auto-shutter evaluation and stitching.

use std::path::PathBuf;

/// What a single orientation sample led to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShutterOutcome {
    /// Not scanning.
    Inactive,
    /// Every target is already captured.
    NoTarget,
    /// Closest target is outside the capture cone.
    Misaligned { index: usize, angle: f64 },
    /// Aligned but the device is still moving.
    Unstable { index: usize, rate: f64 },
    /// The retained frame lock was not acquired in time.
    FrameBusy { index: usize },
    /// Nothing retained yet.
    NoFrame { index: usize },
    Captured { index: usize },
    /// Too few inliers; the target stays open for a later attempt.
    FewInliers { index: usize },
    /// Engine returned another code; attempt skipped.
    Rejected { index: usize, code: i32 },
    /// Planes of the retained frame could not be packed.
    ExtractionFailed { index: usize },
}

impl ShutterOutcome {
    /// Whether the mosaic engine was called for this sample.
    pub fn attempted(&self) -> bool {
        matches!(
            self,
            Self::Captured { .. } | Self::FewInliers { .. } | Self::Rejected { .. }
        )
    }
}

/// Result of finishing a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchReport {
    /// Where the photosphere was (to be) written.
    pub path: PathBuf,
    pub captured: usize,
    pub total: usize,
    /// Failure reason when the export did not succeed.
    pub error: Option<String>,
}

impl StitchReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
