use nalgebra::Vector3;

/// Kind of inertial reading forwarded to the mapping engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuKind {
    Accelerometer,
    Gyroscope,
}

/// A single reading from one of the motion sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    /// Specific force in m/s^2 (device frame).
    Accelerometer(Vector3<f64>),
    /// Angular rate in rad/s (device frame).
    Gyroscope(Vector3<f64>),
    /// Imaginary part of the device-to-world quaternion, scalar part optional.
    RotationVector { xyz: Vector3<f64>, w: Option<f64> },
}

/// Timestamped sensor event as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub timestamp_ns: i64,
    pub reading: SensorReading,
}

impl SensorEvent {
    pub fn accelerometer(timestamp_ns: i64, accel: Vector3<f64>) -> Self {
        Self {
            timestamp_ns,
            reading: SensorReading::Accelerometer(accel),
        }
    }

    pub fn gyroscope(timestamp_ns: i64, gyro: Vector3<f64>) -> Self {
        Self {
            timestamp_ns,
            reading: SensorReading::Gyroscope(gyro),
        }
    }

    pub fn rotation_vector(timestamp_ns: i64, xyz: Vector3<f64>, w: Option<f64>) -> Self {
        Self {
            timestamp_ns,
            reading: SensorReading::RotationVector { xyz, w },
        }
    }

    /// Inertial kind and vector, if this event is forwarded to the engine.
    pub fn imu_reading(&self) -> Option<(ImuKind, Vector3<f64>)> {
        match self.reading {
            SensorReading::Accelerometer(v) => Some((ImuKind::Accelerometer, v)),
            SensorReading::Gyroscope(v) => Some((ImuKind::Gyroscope, v)),
            SensorReading::RotationVector { .. } => None,
        }
    }

    pub fn timestamp_s(&self) -> f64 {
        self.timestamp_ns as f64 * 1e-9
    }
}
