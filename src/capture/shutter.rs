//! Auto-shutter: captures a target when the camera is aligned with it and
//! the device is steady.
//!
//! Runs inline on the sensor path. The only lock it takes is the bounded
//! wait for the retained frame, held just long enough to pack its planes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::ShutterConfig;
use crate::engine::{MappingEngine, MosaicResult};
use crate::geometry::angle_between;
use crate::imu::OrientationSample;
use crate::system::events::{EventBus, PipelineEvent};
use crate::system::shared_state::{RetainedAccess, RetainedFrame};

use super::lattice::TargetLattice;
use super::packing::pack_planes;
use super::result::{ShutterOutcome, StitchReport};
use super::state::ShutterState;

/// File name of the stitched output inside its timestamped directory.
pub const PHOTOSPHERE_FILE_NAME: &str = "photosphere.jpg";

pub struct AutoShutterController {
    lattice: TargetLattice,
    config: ShutterConfig,
    export_root: PathBuf,
    engine: Arc<dyn MappingEngine>,
    events: EventBus,
    state: ShutterState,
    /// Successful captures since the scan started.
    progress: usize,
}

impl AutoShutterController {
    pub fn new(
        lattice: TargetLattice,
        config: ShutterConfig,
        export_root: impl Into<PathBuf>,
        engine: Arc<dyn MappingEngine>,
        events: EventBus,
    ) -> Self {
        let controller = Self {
            lattice,
            config,
            export_root: export_root.into(),
            engine,
            events,
            state: ShutterState::Idle,
            progress: 0,
        };
        controller.sync_targets();
        controller
    }

    pub fn state(&self) -> ShutterState {
        self.state
    }

    pub fn lattice(&self) -> &TargetLattice {
        &self.lattice
    }

    pub fn progress(&self) -> usize {
        self.progress
    }

    pub fn coverage(&self) -> f64 {
        self.lattice.coverage()
    }

    /// Begin a scan. Clears every capture flag. Returns `false` if a scan is
    /// already running.
    pub fn start(&mut self) -> bool {
        if self.state == ShutterState::Scanning {
            return false;
        }
        self.lattice.reset();
        self.progress = 0;
        self.sync_targets();
        self.set_state(ShutterState::Scanning);
        info!(targets = self.lattice.len(), "Scan started");
        true
    }

    /// Abandon any scan and clear capture progress.
    pub fn reset(&mut self) {
        self.lattice.reset();
        self.progress = 0;
        self.sync_targets();
        self.set_state(ShutterState::Idle);
    }

    /// Evaluate one orientation sample against the closest open target.
    pub fn on_orientation(
        &mut self,
        sample: &OrientationSample,
        retained: &RetainedFrame,
    ) -> ShutterOutcome {
        if self.state != ShutterState::Scanning {
            return ShutterOutcome::Inactive;
        }

        let Some(index) = self.lattice.closest_uncaptured(&sample.forward) else {
            return ShutterOutcome::NoTarget;
        };
        let Some(target) = self.lattice.direction(index) else {
            return ShutterOutcome::NoTarget;
        };
        let angle = angle_between(&sample.forward, &target.position).unwrap_or(f64::INFINITY);

        if angle >= self.config.capture_angle_threshold {
            return ShutterOutcome::Misaligned { index, angle };
        }
        if sample.angular_rate >= self.config.stability_threshold {
            return ShutterOutcome::Unstable {
                index,
                rate: sample.angular_rate,
            };
        }

        let timeout = Duration::from_millis(self.config.frame_lock_timeout_ms);
        let order = self.config.plane_order;
        let packed = match retained.with_frame(timeout, |frame| pack_planes(frame.image(), order)) {
            RetainedAccess::Busy => {
                debug!(index, "Retained frame busy, skipping sample");
                return ShutterOutcome::FrameBusy { index };
            }
            RetainedAccess::Empty => return ShutterOutcome::NoFrame { index },
            RetainedAccess::Ready(Err(e)) => {
                warn!(index, "Could not extract capture frame: {}", e);
                return ShutterOutcome::ExtractionFailed { index };
            }
            RetainedAccess::Ready(Ok(packed)) => packed,
        };

        let orientation = sample.rotation.cast::<f32>();
        let outcome = match self.engine.add_frame_to_mosaic(&packed, &orientation) {
            MosaicResult::Ok => {
                self.lattice.mark_captured(index);
                self.progress += 1;
                info!(
                    index,
                    captured = self.progress,
                    total = self.lattice.len(),
                    "Target captured"
                );
                self.events.publish(PipelineEvent::TargetCaptured {
                    index,
                    captured: self.progress,
                    total: self.lattice.len(),
                });
                self.sync_targets();
                ShutterOutcome::Captured { index }
            }
            MosaicResult::FewInliers => {
                warn!(index, "Too few inliers, target left open");
                self.events.publish(PipelineEvent::CaptureRetry { index });
                ShutterOutcome::FewInliers { index }
            }
            MosaicResult::Error(code) => {
                warn!(index, code, "Mosaic engine skipped capture");
                self.events.publish(PipelineEvent::CaptureSkipped { index, code });
                ShutterOutcome::Rejected { index, code }
            }
        };

        if self.lattice.is_complete() {
            info!("All targets captured");
            self.set_state(ShutterState::Complete);
        }
        outcome
    }

    /// Finish the scan and stitch whatever was captured.
    ///
    /// Scanning is forced to Complete first. Returns `None` when idle. The
    /// controller is Idle afterwards, whether or not the export succeeded.
    pub fn finish(&mut self) -> Option<StitchReport> {
        match self.state {
            ShutterState::Idle => return None,
            ShutterState::Scanning => self.set_state(ShutterState::Complete),
            ShutterState::Complete => {}
        }

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let report = self.stitch(&self.export_root.join(stamp));
        self.set_state(ShutterState::Idle);
        Some(report)
    }

    fn stitch(&self, directory: &Path) -> StitchReport {
        let path = directory.join(PHOTOSPHERE_FILE_NAME);
        let result = fs::create_dir_all(directory)
            .map_err(|e| format!("could not create {:?}: {}", directory, e))
            .and_then(|()| {
                self.engine
                    .save_photosphere(&path)
                    .map_err(|e| e.to_string())
            });

        match &result {
            Ok(()) => {
                info!(path = ?path, captured = self.progress, "Photosphere saved");
                self.events
                    .publish(PipelineEvent::PhotosphereSaved { path: path.clone() });
            }
            Err(reason) => {
                warn!(path = ?path, "Photosphere export failed: {}", reason);
                self.events.publish(PipelineEvent::ExportFailed {
                    reason: reason.clone(),
                });
            }
        }

        StitchReport {
            path,
            captured: self.progress,
            total: self.lattice.len(),
            error: result.err(),
        }
    }

    /// Push the open targets for rendering. Captured targets disappear.
    fn sync_targets(&self) {
        let positions = self.lattice.uncaptured_positions();
        let flags = vec![false; positions.len() / 3];
        self.engine.set_capture_targets(&positions, &flags);
    }

    fn set_state(&mut self, state: ShutterState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "Shutter state change");
        self.state = state;
        self.events.publish(PipelineEvent::ShutterStateChanged(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::frame::QueuedFrame;
    use crate::camera::image::OwnedImage;
    use crate::engine::RecordingEngine;
    use crate::geometry::rotation_looking_at;
    use crate::imu::OrientationAdapter;
    use crate::system::events::EventLog;
    use nalgebra::Vector3;

    struct Fixture {
        controller: AutoShutterController,
        engine: Arc<RecordingEngine>,
        log: Arc<EventLog>,
        retained: RetainedFrame,
        _export: tempfile::TempDir,
    }

    fn fixture(num_targets: usize) -> Fixture {
        let engine = Arc::new(RecordingEngine::new());
        let events = EventBus::new();
        let log = EventLog::new(100);
        events.subscribe(log.clone());
        let export = tempfile::tempdir().unwrap();

        let controller = AutoShutterController::new(
            TargetLattice::generate(num_targets, 5.0),
            ShutterConfig::default(),
            export.path(),
            engine.clone(),
            events,
        );

        let retained = RetainedFrame::new();
        let image = OwnedImage::yuv420(4, 2, 1, 10, 20, 30);
        retained.replace(QueuedFrame::from_image(Box::new(image)).unwrap());

        Fixture {
            controller,
            engine,
            log,
            retained,
            _export: export,
        }
    }

    fn sample_towards(direction: &Vector3<f64>, rate: f64) -> OrientationSample {
        let rotation = rotation_looking_at(direction).unwrap();
        OrientationAdapter::new(false).adapt(&rotation, &Vector3::new(rate, 0.0, 0.0), 0)
    }

    fn target(f: &Fixture, index: usize) -> Vector3<f64> {
        f.controller.lattice().direction(index).unwrap().position
    }

    #[test]
    fn test_inactive_until_started() {
        let mut f = fixture(26);
        let sample = sample_towards(&target(&f, 0), 0.0);

        assert_eq!(
            f.controller.on_orientation(&sample, &f.retained),
            ShutterOutcome::Inactive
        );
        assert_eq!(f.engine.mosaic_attempts(), 0);
    }

    #[test]
    fn test_aligned_and_still_triggers_capture() {
        let mut f = fixture(26);
        f.controller.start();
        let sample = sample_towards(&target(&f, 5), 0.0);

        let outcome = f.controller.on_orientation(&sample, &f.retained);

        assert_eq!(outcome, ShutterOutcome::Captured { index: 5 });
        assert!(f.controller.lattice().direction(5).unwrap().captured);
        assert_eq!(f.controller.progress(), 1);

        // Packed Y, V, U with the orientation used for the sample.
        let (packed, orientation) = f.engine.last_mosaic_input().unwrap();
        assert_eq!(packed, vec![10, 10, 10, 10, 10, 10, 10, 10, 30, 30, 20, 20]);
        assert_eq!(orientation, sample.rotation.cast::<f32>());

        // Captured target no longer pushed for rendering.
        let (positions, flags) = f.engine.last_targets().unwrap();
        assert_eq!(positions.len(), 25 * 3);
        assert!(flags.iter().all(|&c| !c));
    }

    #[test]
    fn test_stability_gate_suppresses_capture() {
        let mut f = fixture(26);
        f.controller.start();
        let threshold = ShutterConfig::default().stability_threshold;
        let sample = sample_towards(&target(&f, 3), threshold);

        let outcome = f.controller.on_orientation(&sample, &f.retained);

        assert!(matches!(outcome, ShutterOutcome::Unstable { index: 3, .. }));
        assert_eq!(f.engine.mosaic_attempts(), 0);
    }

    #[test]
    fn test_misaligned_sample_is_ignored() {
        let mut f = fixture(26);
        f.controller.start();
        let t = target(&f, 10).normalize();
        // Rotate slightly off the target, beyond the capture cone.
        let off = (t + t.cross(&Vector3::z()).normalize() * 0.2).normalize();
        let sample = sample_towards(&off, 0.0);

        let outcome = f.controller.on_orientation(&sample, &f.retained);

        assert!(matches!(outcome, ShutterOutcome::Misaligned { .. }));
        assert_eq!(f.engine.mosaic_attempts(), 0);
    }

    #[test]
    fn test_no_retained_frame_is_a_no_op() {
        let mut f = fixture(26);
        f.controller.start();
        f.retained.clear();
        let sample = sample_towards(&target(&f, 0), 0.0);

        assert_eq!(
            f.controller.on_orientation(&sample, &f.retained),
            ShutterOutcome::NoFrame { index: 0 }
        );
        assert_eq!(f.engine.mosaic_attempts(), 0);
    }

    #[test]
    fn test_few_inliers_leaves_target_open_for_retry() {
        let mut f = fixture(26);
        f.engine.push_mosaic_results([MosaicResult::FewInliers]);
        f.controller.start();
        let sample = sample_towards(&target(&f, 2), 0.0);

        assert_eq!(
            f.controller.on_orientation(&sample, &f.retained),
            ShutterOutcome::FewInliers { index: 2 }
        );
        assert!(!f.controller.lattice().direction(2).unwrap().captured);

        assert_eq!(
            f.controller.on_orientation(&sample, &f.retained),
            ShutterOutcome::Captured { index: 2 }
        );
        assert!(f.log.events().contains(&PipelineEvent::CaptureRetry { index: 2 }));
    }

    #[test]
    fn test_engine_error_code_is_skipped() {
        let mut f = fixture(26);
        f.engine.push_mosaic_results([MosaicResult::Error(-1)]);
        f.controller.start();
        let sample = sample_towards(&target(&f, 0), 0.0);

        assert_eq!(
            f.controller.on_orientation(&sample, &f.retained),
            ShutterOutcome::Rejected { index: 0, code: -1 }
        );
        assert_eq!(f.controller.progress(), 0);
        assert_eq!(f.log.warnings().len(), 1);
    }

    #[test]
    fn test_full_coverage_completes_scan() {
        let mut f = fixture(26);
        f.controller.start();

        for index in 0..26 {
            let sample = sample_towards(&target(&f, index), 0.0);
            assert_eq!(
                f.controller.on_orientation(&sample, &f.retained),
                ShutterOutcome::Captured { index }
            );
        }

        assert_eq!(f.controller.coverage(), 1.0);
        assert_eq!(f.controller.state(), ShutterState::Complete);
        assert_eq!(
            f.controller.on_orientation(&sample_towards(&Vector3::x(), 0.0), &f.retained),
            ShutterOutcome::Inactive
        );

        let report = f.controller.finish().unwrap();
        assert!(report.succeeded());
        assert_eq!((report.captured, report.total), (26, 26));
        assert!(report.path.parent().unwrap().is_dir());
        assert!(report.path.ends_with(PHOTOSPHERE_FILE_NAME));
        assert_eq!(f.controller.state(), ShutterState::Idle);
        assert!(f.log.events().contains(&PipelineEvent::ShutterStateChanged(
            ShutterState::Complete
        )));
    }

    #[test]
    fn test_finish_early_forces_complete_then_idle() {
        let mut f = fixture(26);
        assert!(f.controller.finish().is_none());

        f.controller.start();
        f.engine.set_fail_photosphere(true);
        let report = f.controller.finish().unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.captured, 0);
        assert_eq!(f.controller.state(), ShutterState::Idle);

        let states: Vec<_> = f
            .log
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::ShutterStateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![ShutterState::Scanning, ShutterState::Complete, ShutterState::Idle]
        );
    }

    #[test]
    fn test_restart_clears_progress() {
        let mut f = fixture(26);
        f.controller.start();
        let sample = sample_towards(&target(&f, 0), 0.0);
        f.controller.on_orientation(&sample, &f.retained);
        assert_eq!(f.controller.progress(), 1);

        f.controller.finish();
        assert!(f.controller.start());
        assert_eq!(f.controller.progress(), 0);
        assert_eq!(f.controller.lattice().captured_count(), 0);
        assert!(!f.controller.start());
    }
}
