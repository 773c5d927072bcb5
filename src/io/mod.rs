//! File inputs for replaying recorded sessions.

pub mod sensor_log;

pub use sensor_log::{load_sensor_log, read_sensor_log};
