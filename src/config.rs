//! Pipeline configuration.
//!
//! All sections default to the nominal values used on device, so a YAML file
//! only needs to name the keys it overrides:
//!
//! ```yaml
//! shutter:
//!   capture_angle_threshold: 0.08
//!   plane_order: yuv
//! queue:
//!   capacity: 3
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::camera::backend::Size;
use crate::capture::packing::PlaneOrder;

/// Target lattice parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    /// Number of capture directions.
    pub num_targets: usize,
    /// Radius the unit directions are scaled by (renderer units).
    pub radius: f64,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            num_targets: 26,
            radius: 5.0,
        }
    }
}

/// Auto-shutter gates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutterConfig {
    /// Maximum angle (rad) between camera forward and a target to trigger.
    pub capture_angle_threshold: f64,
    /// Maximum gyro magnitude (rad/s) at which the device counts as steady.
    pub stability_threshold: f64,
    /// Byte order of the packed chroma planes handed to the mosaic engine.
    pub plane_order: PlaneOrder,
    /// Upper bound on the wait for the retained-frame lock from the sensor path.
    pub frame_lock_timeout_ms: u64,
}

impl Default for ShutterConfig {
    fn default() -> Self {
        Self {
            capture_angle_threshold: 0.05,
            stability_threshold: 0.12,
            plane_order: PlaneOrder::Yvu,
            frame_lock_timeout_ms: 5,
        }
    }
}

/// Stream negotiation parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Planar stream size the negotiation aims for.
    pub target_size: Size,
    /// Compressed stream size the negotiation aims for.
    pub compressed_target_size: Size,
    /// Pixel-count ceiling for the compressed stream.
    pub max_compressed_pixels: u64,
    /// Whether to request the secondary compressed stream at all.
    pub enable_compressed_stream: bool,
    /// Buffers the planar reader may hold at once.
    pub max_images: usize,
    /// Buffers the compressed reader may hold at once.
    pub compressed_max_images: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            target_size: Size::new(1280, 720),
            compressed_target_size: Size::new(3840, 2160),
            max_compressed_pixels: 4096 * 3072,
            enable_compressed_stream: true,
            max_images: 5,
            compressed_max_images: 2,
        }
    }
}

/// Frame queue parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 2 }
    }
}

/// Orientation source parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Remap device axes for landscape holding (x ← y, y ← -x).
    pub remap_landscape: bool,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            remap_landscape: true,
        }
    }
}

/// Photosphere export parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Root directory; each stitch gets a timestamped subdirectory.
    pub directory: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("captures"),
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub lattice: LatticeConfig,
    pub shutter: ShutterConfig,
    pub camera: CameraConfig,
    pub queue: QueueConfig,
    pub orientation: OrientationConfig,
    pub export: ExportConfig,
}

impl CaptureConfig {
    /// Load and validate a YAML configuration file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let config: CaptureConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: CaptureConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lattice.num_targets < 2 {
            bail!(
                "lattice.num_targets must be at least 2, got {}",
                self.lattice.num_targets
            );
        }
        if !(self.lattice.radius > 0.0) {
            bail!("lattice.radius must be positive, got {}", self.lattice.radius);
        }
        if !(self.shutter.capture_angle_threshold > 0.0) {
            bail!(
                "shutter.capture_angle_threshold must be positive, got {}",
                self.shutter.capture_angle_threshold
            );
        }
        if !(self.shutter.stability_threshold > 0.0) {
            bail!(
                "shutter.stability_threshold must be positive, got {}",
                self.shutter.stability_threshold
            );
        }
        if self.queue.capacity == 0 {
            bail!("queue.capacity must be at least 1");
        }
        if self.camera.target_size.pixel_count() == 0 {
            bail!("camera.target_size must be non-empty");
        }
        Ok(())
    }
}
