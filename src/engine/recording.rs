//! In-process engine that records every call.
//!
//! Stands in for the native engine in dry runs and tests: mosaic results can
//! be scripted, frame and export failures injected, and every call inspected
//! afterwards.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::{Matrix3, Matrix4, Vector3};
use parking_lot::Mutex;
use tracing::debug;

use crate::camera::frame::FrameView;
use crate::error::{CaptureError, CaptureResult};
use crate::imu::ImuKind;

use super::MappingEngine;
use super::types::{EngineTrackingState, MosaicResult};

/// One recorded engine call. Frames are recorded separately by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    ProcessImu { kind: ImuKind, timestamp_ns: i64 },
    AddFrameToMosaic { bytes: usize },
    AllocateMosaic { width: u32, height: u32 },
    FreeMosaic,
    SetCaptureTargets { positions: Vec<f32>, captured: Vec<bool> },
    SetCameraPose,
    SaveMap(PathBuf),
    LoadMap(PathBuf),
    SavePhotosphere(PathBuf),
    ResetSystem,
}

#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<EngineCall>>,
    frame_timestamps: Mutex<Vec<f64>>,
    scripted_results: Mutex<VecDeque<MosaicResult>>,
    last_mosaic_input: Mutex<Option<(Vec<u8>, Matrix3<f32>)>>,
    last_pose: Mutex<Option<Matrix4<f32>>>,
    fail_frames: AtomicBool,
    fail_photosphere: AtomicBool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue results for upcoming mosaic insertions; `Ok` once exhausted.
    pub fn push_mosaic_results(&self, results: impl IntoIterator<Item = MosaicResult>) {
        self.scripted_results.lock().extend(results);
    }

    pub fn set_fail_frames(&self, fail: bool) {
        self.fail_frames.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_photosphere(&self, fail: bool) {
        self.fail_photosphere.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    /// Timestamps (s) of every frame passed to `process_frame`, in call order.
    pub fn processed_frame_timestamps(&self) -> Vec<f64> {
        self.frame_timestamps.lock().clone()
    }

    pub fn mosaic_attempts(&self) -> usize {
        self.count_calls(|c| matches!(c, EngineCall::AddFrameToMosaic { .. }))
    }

    pub fn last_mosaic_input(&self) -> Option<(Vec<u8>, Matrix3<f32>)> {
        self.last_mosaic_input.lock().clone()
    }

    pub fn last_camera_pose(&self) -> Option<Matrix4<f32>> {
        *self.last_pose.lock()
    }

    /// Most recent target geometry pushed for rendering.
    pub fn last_targets(&self) -> Option<(Vec<f32>, Vec<bool>)> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            EngineCall::SetCaptureTargets { positions, captured } => {
                Some((positions.clone(), captured.clone()))
            }
            _ => None,
        })
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

impl MappingEngine for RecordingEngine {
    fn process_frame(&self, frame: &FrameView<'_>) -> CaptureResult<()> {
        self.frame_timestamps.lock().push(frame.timestamp_s);
        if self.fail_frames.load(Ordering::SeqCst) {
            return Err(CaptureError::Engine(format!(
                "rejected frame at {:.3}s",
                frame.timestamp_s
            )));
        }
        Ok(())
    }

    fn process_imu(&self, kind: ImuKind, _values: Vector3<f32>, timestamp_ns: i64) {
        self.record(EngineCall::ProcessImu { kind, timestamp_ns });
    }

    fn add_frame_to_mosaic(&self, packed_planes: &[u8], orientation: &Matrix3<f32>) -> MosaicResult {
        self.record(EngineCall::AddFrameToMosaic {
            bytes: packed_planes.len(),
        });
        *self.last_mosaic_input.lock() = Some((packed_planes.to_vec(), *orientation));
        let result = self
            .scripted_results
            .lock()
            .pop_front()
            .unwrap_or(MosaicResult::Ok);
        debug!(?result, bytes = packed_planes.len(), "Mosaic insertion");
        result
    }

    fn allocate_mosaic(&self, width: u32, height: u32) {
        self.record(EngineCall::AllocateMosaic { width, height });
    }

    fn free_mosaic(&self) {
        self.record(EngineCall::FreeMosaic);
    }

    fn tracking_state(&self) -> EngineTrackingState {
        if self.frame_timestamps.lock().is_empty() {
            EngineTrackingState::NoImages
        } else {
            EngineTrackingState::Tracking
        }
    }

    fn map_stats(&self) -> String {
        format!(
            "frames: {}, mosaic frames: {}",
            self.frame_timestamps.lock().len(),
            self.mosaic_attempts()
        )
    }

    fn set_capture_targets(&self, positions: &[f32], captured: &[bool]) {
        self.record(EngineCall::SetCaptureTargets {
            positions: positions.to_vec(),
            captured: captured.to_vec(),
        });
    }

    fn set_camera_pose(&self, view: &Matrix4<f32>) {
        *self.last_pose.lock() = Some(*view);
        self.record(EngineCall::SetCameraPose);
    }

    fn save_map(&self, path: &Path) -> CaptureResult<()> {
        self.record(EngineCall::SaveMap(path.to_path_buf()));
        Ok(())
    }

    fn load_map(&self, path: &Path) -> bool {
        self.record(EngineCall::LoadMap(path.to_path_buf()));
        path.exists()
    }

    fn save_photosphere(&self, path: &Path) -> CaptureResult<()> {
        self.record(EngineCall::SavePhotosphere(path.to_path_buf()));
        if self.fail_photosphere.load(Ordering::SeqCst) {
            return Err(CaptureError::Engine("stitching failed".to_string()));
        }
        Ok(())
    }

    fn reset_system(&self) {
        self.record(EngineCall::ResetSystem);
    }
}
