pub mod camera;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod imu;
pub mod io;
pub mod system;
