//! Capture System - top-level entry point and thread orchestration.
//!
//! `CaptureSystem` owns the camera session, the frame queue, the shared
//! retained-frame slot and the auto-shutter, and spawns the frame processing
//! thread. Sensor events are handled inline on the caller's thread.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::camera::backend::{CameraBackend, DeviceEvent, Size};
use crate::camera::session::CameraSession;
use crate::camera::state::CaptureSessionState;
use crate::capture::lattice::TargetLattice;
use crate::capture::result::{ShutterOutcome, StitchReport};
use crate::capture::shutter::AutoShutterController;
use crate::capture::state::{CaptureMode, ShutterState};
use crate::config::CaptureConfig;
use crate::engine::{EngineTrackingState, MappingEngine};
use crate::error::CaptureResult;
use crate::geometry::view_matrix;
use crate::imu::{OrientationAdapter, OrientationSample, SensorEvent, SensorReading};

use super::events::{EventBus, PipelineEvent};
use super::frame_queue::{FrameQueue, QueueStats};
use super::processing_loop::spawn_processing_loop;
use super::shared_state::SharedState;

/// What the user action button did.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    ScanStarted,
    ScanFinished(Option<StitchReport>),
    /// Tracking mode: the external system was reset.
    SystemReset,
}

/// Main capture pipeline.
pub struct CaptureSystem {
    engine: Arc<dyn MappingEngine>,
    queue: Arc<FrameQueue>,

    /// Retained frame and counters shared with the processing thread.
    shared: Arc<SharedState>,

    camera: CameraSession,
    shutter: AutoShutterController,
    adapter: OrientationAdapter,
    events: EventBus,
    mode: CaptureMode,

    /// Latest gyroscope reading, used as the angular-rate source.
    latest_gyro: Vector3<f64>,
    latest_orientation: Option<OrientationSample>,

    /// Frame size the engine's mosaic memory is allocated for.
    mosaic_size: Option<Size>,

    /// Handle to the frame processing thread.
    processing_handle: Option<JoinHandle<()>>,
}

impl CaptureSystem {
    /// Build the pipeline and spawn the processing thread. The camera is not
    /// opened until [`start_camera`](Self::start_camera).
    pub fn new(
        config: CaptureConfig,
        backend: Box<dyn CameraBackend>,
        engine: Arc<dyn MappingEngine>,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(FrameQueue::new(config.queue.capacity));
        let shared = SharedState::new();

        let processing_handle =
            spawn_processing_loop(queue.clone(), engine.clone(), shared.clone())
                .context("Failed to spawn frame processing thread")?;

        let camera = CameraSession::new(backend, config.camera.clone(), queue.clone(), events.clone());
        let lattice = TargetLattice::generate(config.lattice.num_targets, config.lattice.radius);
        let shutter = AutoShutterController::new(
            lattice,
            config.shutter.clone(),
            config.export.directory.clone(),
            engine.clone(),
            events.clone(),
        );

        info!(
            targets = config.lattice.num_targets,
            queue_capacity = config.queue.capacity,
            "Capture system ready"
        );

        Ok(Self {
            engine,
            queue,
            shared,
            camera,
            shutter,
            adapter: OrientationAdapter::new(config.orientation.remap_landscape),
            events,
            mode: CaptureMode::default(),
            latest_gyro: Vector3::zeros(),
            latest_orientation: None,
            mosaic_size: None,
            processing_handle: Some(processing_handle),
        })
    }

    /// Open the camera and allocate mosaic memory for the negotiated stream.
    pub fn start_camera(&mut self) -> CaptureResult<()> {
        self.camera.open()?;

        if let Some(streams) = self.camera.negotiated_streams() {
            if self.mosaic_size != Some(streams.primary) {
                if self.mosaic_size.take().is_some() {
                    self.engine.free_mosaic();
                }
                self.engine
                    .allocate_mosaic(streams.primary.width, streams.primary.height);
                self.mosaic_size = Some(streams.primary);
                debug!(size = %streams.primary, "Mosaic memory allocated");
            }
        }
        Ok(())
    }

    pub fn stop_camera(&mut self) {
        self.camera.close();
    }

    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        self.camera.handle_device_event(event);
    }

    pub fn camera_state(&self) -> CaptureSessionState {
        self.camera.state()
    }

    /// Route one sensor event. Returns the auto-shutter outcome for rotation
    /// events evaluated in Creation mode.
    pub fn handle_sensor_event(&mut self, event: &SensorEvent) -> Option<ShutterOutcome> {
        if let Some((kind, values)) = event.imu_reading() {
            self.engine
                .process_imu(kind, values.cast::<f32>(), event.timestamp_ns);
        }

        match event.reading {
            SensorReading::Gyroscope(gyro) => {
                self.latest_gyro = gyro;
                None
            }
            SensorReading::Accelerometer(_) => None,
            SensorReading::RotationVector { xyz, w } => {
                let mut values = vec![xyz.x, xyz.y, xyz.z];
                values.extend(w);
                let Some(sample) =
                    self.adapter
                        .adapt_rotation_vector(&values, &self.latest_gyro, event.timestamp_ns)
                else {
                    debug!(timestamp_ns = event.timestamp_ns, "Ignoring degenerate rotation vector");
                    return None;
                };
                self.on_orientation(sample)
            }
        }
    }

    fn on_orientation(&mut self, sample: OrientationSample) -> Option<ShutterOutcome> {
        self.engine
            .set_camera_pose(&view_matrix(&sample.rotation).cast::<f32>());
        self.latest_orientation = Some(sample);

        match self.mode {
            CaptureMode::Creation => Some(self.shutter.on_orientation(&sample, &self.shared.retained)),
            CaptureMode::Tracking => None,
        }
    }

    pub fn latest_orientation(&self) -> Option<&OrientationSample> {
        self.latest_orientation.as_ref()
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Switch between Creation and Tracking. The external system is reset;
    /// entering Creation also clears capture progress.
    pub fn toggle_mode(&mut self) -> CaptureMode {
        self.mode = self.mode.toggled();
        self.engine.reset_system();
        if self.mode == CaptureMode::Creation {
            self.shutter.reset();
        }
        info!(mode = ?self.mode, "Capture mode changed");
        self.events.publish(PipelineEvent::ModeChanged(self.mode));
        self.mode
    }

    /// The single user action: start or finish a scan in Creation mode,
    /// reset the external system in Tracking mode.
    pub fn handle_action(&mut self) -> ActionOutcome {
        match self.mode {
            CaptureMode::Creation => {
                if self.shutter.state() == ShutterState::Idle {
                    self.start_scan();
                    ActionOutcome::ScanStarted
                } else {
                    ActionOutcome::ScanFinished(self.finish_scan())
                }
            }
            CaptureMode::Tracking => {
                self.engine.reset_system();
                info!("Tracking system reset");
                ActionOutcome::SystemReset
            }
        }
    }

    pub fn start_scan(&mut self) -> bool {
        self.shutter.start()
    }

    /// Finish the current scan and export the photosphere.
    pub fn finish_scan(&mut self) -> Option<StitchReport> {
        self.shutter.finish()
    }

    pub fn shutter_state(&self) -> ShutterState {
        self.shutter.state()
    }

    pub fn lattice(&self) -> &TargetLattice {
        self.shutter.lattice()
    }

    pub fn coverage(&self) -> f64 {
        self.shutter.coverage()
    }

    pub fn progress(&self) -> usize {
        self.shutter.progress()
    }

    pub fn save_map(&self, path: &Path) -> CaptureResult<()> {
        self.engine.save_map(path)
    }

    pub fn load_map(&self, path: &Path) -> bool {
        self.engine.load_map(path)
    }

    pub fn tracking_state(&self) -> EngineTrackingState {
        self.engine.tracking_state()
    }

    pub fn map_stats(&self) -> String {
        self.engine.map_stats()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Shutdown the pipeline gracefully.
    ///
    /// Closes the camera, stops the processing thread (which drains the
    /// queue and releases the retained frame) and frees mosaic memory.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.processing_handle.take() else {
            return;
        };

        self.camera.close();

        self.shared.request_shutdown();
        self.queue.close();
        if handle.join().is_err() {
            warn!("Frame processing thread panicked");
        }
        // Frames delivered after the loop exited.
        self.queue.drain();

        if self.mosaic_size.take().is_some() {
            self.engine.free_mosaic();
        }
        info!(
            frames = self.shared.frames_processed(),
            captures = self.shutter.progress(),
            "Capture system stopped"
        );
    }
}

impl Drop for CaptureSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::image::OwnedImage;
    use crate::camera::virtual_camera::VirtualCamera;
    use crate::engine::{EngineCall, RecordingEngine};
    use crate::geometry::rotation_looking_at;
    use crate::imu::ImuKind;
    use crate::system::events::EventLog;
    use nalgebra::{Rotation3, UnitQuaternion};
    use std::thread;
    use std::time::{Duration, Instant};

    struct Fixture {
        system: CaptureSystem,
        camera: VirtualCamera,
        engine: Arc<RecordingEngine>,
        log: Arc<EventLog>,
        _export: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let export = tempfile::tempdir().unwrap();
        let mut config = CaptureConfig::default();
        config.export.directory = export.path().to_path_buf();

        let camera = VirtualCamera::new();
        let engine = Arc::new(RecordingEngine::new());
        let events = EventBus::new();
        let log = EventLog::new(256);
        events.subscribe(log.clone());

        let system =
            CaptureSystem::new(config, Box::new(camera.clone()), engine.clone(), events).unwrap();
        Fixture {
            system,
            camera,
            engine,
            log,
            _export: export,
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Start the camera and get one frame into the retained slot.
    fn stream_one_frame(f: &mut Fixture) {
        f.system.start_camera().unwrap();
        assert!(f.camera.deliver_frame(Box::new(OwnedImage::yuv420(8, 4, 1, 50, 60, 70))));
        let shared = f.system.shared_state().clone();
        wait_for(|| shared.frames_processed() == 1);
    }

    fn rotation_event(timestamp_ns: i64, forward: &Vector3<f64>) -> SensorEvent {
        let r = rotation_looking_at(forward).unwrap();
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
        SensorEvent::rotation_vector(timestamp_ns, Vector3::new(q.i, q.j, q.k), Some(q.w))
    }

    #[test]
    fn test_start_camera_allocates_mosaic() {
        let mut f = fixture();
        f.system.start_camera().unwrap();

        assert_eq!(f.system.camera_state(), CaptureSessionState::Streaming);
        assert_eq!(
            f.engine.count_calls(|c| matches!(c, EngineCall::AllocateMosaic { .. })),
            1
        );
        assert!(f.engine.calls().contains(&EngineCall::AllocateMosaic {
            width: 1280,
            height: 720
        }));

        // Reopening at the same size keeps the allocation.
        f.system.stop_camera();
        f.system.start_camera().unwrap();
        assert_eq!(
            f.engine.count_calls(|c| matches!(c, EngineCall::AllocateMosaic { .. })),
            1
        );
    }

    #[test]
    fn test_permission_denied_does_not_allocate() {
        let mut f = fixture();
        f.camera.set_permission(false);

        assert!(f.system.start_camera().is_err());
        assert_eq!(
            f.engine.count_calls(|c| matches!(c, EngineCall::AllocateMosaic { .. })),
            0
        );
    }

    #[test]
    fn test_full_scan_end_to_end() {
        let mut f = fixture();
        stream_one_frame(&mut f);

        assert_eq!(f.system.handle_action(), ActionOutcome::ScanStarted);
        f.system
            .handle_sensor_event(&SensorEvent::gyroscope(0, Vector3::zeros()));

        let targets: Vec<_> = f.system.lattice().iter().map(|d| d.position).collect();
        for (i, target) in targets.iter().enumerate() {
            let outcome = f.system.handle_sensor_event(&rotation_event(i as i64, target));
            assert_eq!(outcome, Some(ShutterOutcome::Captured { index: i }));
        }

        assert_eq!(f.system.shutter_state(), ShutterState::Complete);
        assert_eq!(f.system.progress(), 26);
        assert_eq!(f.engine.mosaic_attempts(), 26);

        let ActionOutcome::ScanFinished(Some(report)) = f.system.handle_action() else {
            panic!("expected a finished scan");
        };
        assert!(report.succeeded());
        assert_eq!(f.system.shutter_state(), ShutterState::Idle);
        assert!(f.log.events().contains(&PipelineEvent::PhotosphereSaved {
            path: report.path.clone()
        }));
    }

    #[test]
    fn test_moving_device_does_not_capture() {
        let mut f = fixture();
        stream_one_frame(&mut f);
        f.system.start_scan();

        f.system
            .handle_sensor_event(&SensorEvent::gyroscope(0, Vector3::new(0.0, 0.5, 0.0)));
        let target = f.system.lattice().direction(4).unwrap().position;
        let outcome = f.system.handle_sensor_event(&rotation_event(1, &target));

        assert!(matches!(outcome, Some(ShutterOutcome::Unstable { index: 4, .. })));
        assert_eq!(f.engine.mosaic_attempts(), 0);
    }

    #[test]
    fn test_inertial_readings_reach_engine() {
        let mut f = fixture();
        f.system
            .handle_sensor_event(&SensorEvent::accelerometer(5, Vector3::new(0.0, 9.8, 0.0)));
        f.system
            .handle_sensor_event(&SensorEvent::gyroscope(6, Vector3::new(0.1, 0.0, 0.0)));

        let imu: Vec<_> = f
            .engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::ProcessImu { .. }))
            .collect();
        assert_eq!(
            imu,
            vec![
                EngineCall::ProcessImu {
                    kind: ImuKind::Accelerometer,
                    timestamp_ns: 5
                },
                EngineCall::ProcessImu {
                    kind: ImuKind::Gyroscope,
                    timestamp_ns: 6
                },
            ]
        );
    }

    #[test]
    fn test_rotation_pushes_camera_pose() {
        let mut f = fixture();
        let outcome = f
            .system
            .handle_sensor_event(&rotation_event(1, &Vector3::new(1.0, 0.0, 0.0)));

        assert_eq!(outcome, Some(ShutterOutcome::Inactive));
        let pose = f.engine.last_camera_pose().unwrap();
        assert_eq!(pose[(3, 3)], 1.0);
        assert_eq!(pose[(0, 3)], 0.0);
        let forward = f.system.latest_orientation().unwrap().forward;
        assert!((forward - Vector3::x()).norm() < 1e-9);
    }

    #[test]
    fn test_tracking_mode_disables_shutter() {
        let mut f = fixture();
        stream_one_frame(&mut f);
        f.system.start_scan();

        assert_eq!(f.system.toggle_mode(), CaptureMode::Tracking);
        let target = f.system.lattice().direction(0).unwrap().position;
        assert_eq!(f.system.handle_sensor_event(&rotation_event(1, &target)), None);
        assert_eq!(f.system.handle_action(), ActionOutcome::SystemReset);
        assert_eq!(f.engine.count_calls(|c| *c == EngineCall::ResetSystem), 2);

        assert_eq!(f.system.toggle_mode(), CaptureMode::Creation);
        assert_eq!(f.system.shutter_state(), ShutterState::Idle);
        assert!(f.log.events().contains(&PipelineEvent::ModeChanged(CaptureMode::Tracking)));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut f = fixture();
        stream_one_frame(&mut f);

        f.system.shutdown();

        assert_eq!(f.system.camera_state(), CaptureSessionState::Closed);
        assert_eq!(f.camera.open_devices(), 0);
        assert!(f.system.shared_state().retained.is_empty());
        assert_eq!(f.engine.count_calls(|c| *c == EngineCall::FreeMosaic), 1);

        f.system.shutdown();
        assert_eq!(f.engine.count_calls(|c| *c == EngineCall::FreeMosaic), 1);
    }

    #[test]
    fn test_map_persistence_passes_through() {
        let f = fixture();
        let path = f._export.path().join("map.bin");

        f.system.save_map(&path).unwrap();
        assert!(!f.system.load_map(&path));
        assert!(f.engine.calls().contains(&EngineCall::SaveMap(path.clone())));
        assert_eq!(f.system.tracking_state(), EngineTrackingState::NoImages);
    }
}
