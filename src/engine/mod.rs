//! Boundary to the external tracking/mosaic engine.
//!
//! The engine does the visual tracking, mosaicking and stitching; the
//! pipeline only feeds it frames, inertial readings and discrete captures.
//! Implementations must be callable from the processing thread and the
//! sensor thread at the same time.

pub mod recording;
pub mod types;

use std::path::Path;

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::camera::frame::FrameView;
use crate::error::CaptureResult;
use crate::imu::ImuKind;

pub use recording::{EngineCall, RecordingEngine};
pub use types::{EngineTrackingState, MosaicResult};

pub trait MappingEngine: Send + Sync {
    /// Continuous tracking input.
    fn process_frame(&self, frame: &FrameView<'_>) -> CaptureResult<()>;

    /// Raw inertial reading.
    fn process_imu(&self, kind: ImuKind, values: Vector3<f32>, timestamp_ns: i64);

    /// Discrete capture: packed YUV planes plus device orientation.
    fn add_frame_to_mosaic(&self, packed_planes: &[u8], orientation: &Matrix3<f32>) -> MosaicResult;

    /// Reserve mosaic buffers for frames of the given size.
    fn allocate_mosaic(&self, width: u32, height: u32);

    fn free_mosaic(&self);

    fn tracking_state(&self) -> EngineTrackingState;

    fn map_stats(&self) -> String;

    /// Target geometry for rendering, flattened xyz.
    fn set_capture_targets(&self, positions: &[f32], captured: &[bool]);

    fn set_camera_pose(&self, view: &Matrix4<f32>);

    fn save_map(&self, path: &Path) -> CaptureResult<()>;

    fn load_map(&self, path: &Path) -> bool;

    /// Stitch everything captured so far and write it to `path`.
    fn save_photosphere(&self, path: &Path) -> CaptureResult<()>;

    fn reset_system(&self);
}
