pub mod orientation;
pub mod sample;

pub use orientation::{OrientationAdapter, OrientationSample, angular_rate_magnitude, camera_forward};
pub use sample::{ImuKind, SensorEvent, SensorReading};
