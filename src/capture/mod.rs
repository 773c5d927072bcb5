//! Guided photosphere capture: target directions, the auto-shutter state
//! machine and plane packing for the mosaic engine.

pub mod lattice;
pub mod packing;
pub mod result;
pub mod shutter;
pub mod state;

pub use lattice::{CaptureDirection, TargetLattice};
pub use packing::{PlaneOrder, pack_planes};
pub use result::{ShutterOutcome, StitchReport};
pub use shutter::{AutoShutterController, PHOTOSPHERE_FILE_NAME};
pub use state::{CaptureMode, ShutterState};
