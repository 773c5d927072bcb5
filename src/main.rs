use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use nalgebra::{Rotation3, UnitQuaternion, Vector3};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sphere_capture::camera::VirtualCamera;
use sphere_capture::capture::{ShutterOutcome, TargetLattice};
use sphere_capture::config::CaptureConfig;
use sphere_capture::engine::RecordingEngine;
use sphere_capture::geometry::rotation_looking_at;
use sphere_capture::imu::SensorEvent;
use sphere_capture::io::load_sensor_log;
use sphere_capture::system::{CaptureSystem, DEFAULT_EVENT_LOG_CAPACITY, EventBus, EventLog};

/// Interval between synthetic camera frames.
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Sample spacing of the synthetic sweep.
const SWEEP_STEP_NS: i64 = 20_000_000;

struct Args {
    sensor_log: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        sensor_log: None,
        config: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            path => args.sensor_log = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

/// Point at every target in turn, holding still on each.
fn synthetic_sweep(lattice: &TargetLattice) -> Vec<SensorEvent> {
    let mut events = Vec::with_capacity(lattice.len() * 2);
    let mut timestamp_ns = 0;
    for direction in lattice.iter() {
        let Some(r) = rotation_looking_at(&direction.position) else {
            continue;
        };
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
        events.push(SensorEvent::gyroscope(timestamp_ns, Vector3::zeros()));
        events.push(SensorEvent::rotation_vector(
            timestamp_ns,
            Vector3::new(q.i, q.j, q.k),
            Some(q.w),
        ));
        timestamp_ns += SWEEP_STEP_NS;
    }
    events
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => CaptureConfig::from_yaml_file(path)?,
        None => CaptureConfig::default(),
    };

    let camera = VirtualCamera::new();
    let engine = Arc::new(RecordingEngine::new());
    let events = EventBus::new();
    let log = EventLog::new(DEFAULT_EVENT_LOG_CAPACITY);
    events.subscribe(log.clone());

    let mut system = CaptureSystem::new(config, Box::new(camera.clone()), engine.clone(), events)?;
    system.start_camera().context("Failed to start camera")?;
    let mut pump = camera.start_pump(FRAME_INTERVAL)?;

    // The shutter needs a retained frame before it can capture anything.
    let deadline = Instant::now() + Duration::from_secs(2);
    while system.shared_state().retained.is_empty() {
        if Instant::now() > deadline {
            bail!("No camera frame arrived");
        }
        thread::sleep(Duration::from_millis(5));
    }

    let sensor_events = match &args.sensor_log {
        Some(path) => {
            let events = load_sensor_log(path)?;
            println!("Replaying {} sensor events from {}", events.len(), path.display());
            events
        }
        None => {
            println!("No sensor log given, running a synthetic sweep");
            synthetic_sweep(system.lattice())
        }
    };

    system.start_scan();
    let mut attempts = 0;
    for event in &sensor_events {
        if let Some(outcome) = system.handle_sensor_event(event) {
            if outcome.attempted() {
                attempts += 1;
            }
            if let ShutterOutcome::Captured { index } = outcome {
                println!(
                    "Captured target {:2} ({}/{})",
                    index,
                    system.progress(),
                    system.lattice().len()
                );
            }
        }
    }

    match system.finish_scan() {
        Some(report) if report.succeeded() => {
            println!("Photosphere written to {}", report.path.display())
        }
        Some(report) => warn!(
            "Photosphere export failed: {}",
            report.error.unwrap_or_default()
        ),
        None => warn!("No scan to finish"),
    }

    pump.stop();
    system.shutdown();

    let stats = system.queue_stats();
    println!(
        "Done! {}/{} targets ({:.0}%), {} mosaic attempts",
        system.progress(),
        system.lattice().len(),
        system.coverage() * 100.0,
        attempts
    );
    println!(
        "Frames: {} admitted, {} evicted, {} processed; engine: {}",
        stats.admitted,
        stats.evicted,
        system.shared_state().frames_processed(),
        system.map_stats()
    );
    for entry in log.warnings() {
        println!("  [{}] {:?}", entry.time_string(), entry.event);
    }
    info!(events = log.len(), "Event log");

    Ok(())
}
