//! Orientation adapter: raw rotation + gyro → camera forward + angular rate.

use nalgebra::{Matrix3, Vector3};

use crate::geometry::{remap_landscape, rotation_from_vector};

/// Orientation derived from one rotation sensor event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Device-to-world rotation after any axis remap.
    pub rotation: Matrix3<f64>,
    /// Unit camera look direction in the world frame.
    pub forward: Vector3<f64>,
    /// Magnitude of the latest gyroscope reading (rad/s).
    pub angular_rate: f64,
    pub timestamp_ns: i64,
}

/// Camera look direction: the negated third column of `R`.
pub fn camera_forward(rotation: &Matrix3<f64>) -> Vector3<f64> {
    -rotation.column(2).into_owned()
}

pub fn angular_rate_magnitude(gyro: &Vector3<f64>) -> f64 {
    gyro.norm()
}

/// Stateless transform from platform orientation to [`OrientationSample`].
#[derive(Debug, Clone, Copy)]
pub struct OrientationAdapter {
    remap_landscape: bool,
}

impl OrientationAdapter {
    pub fn new(remap_landscape: bool) -> Self {
        Self { remap_landscape }
    }

    /// Adapt an already decoded rotation matrix.
    pub fn adapt(
        &self,
        rotation: &Matrix3<f64>,
        gyro: &Vector3<f64>,
        timestamp_ns: i64,
    ) -> OrientationSample {
        let rotation = if self.remap_landscape {
            remap_landscape(rotation)
        } else {
            *rotation
        };
        OrientationSample {
            rotation,
            forward: camera_forward(&rotation),
            angular_rate: angular_rate_magnitude(gyro),
            timestamp_ns,
        }
    }

    /// Adapt a raw rotation vector `[x, y, z]` / `[x, y, z, w]`.
    pub fn adapt_rotation_vector(
        &self,
        values: &[f64],
        gyro: &Vector3<f64>,
        timestamp_ns: i64,
    ) -> Option<OrientationSample> {
        let rotation = rotation_from_vector(values)?;
        Some(self.adapt(&rotation, gyro, timestamp_ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rotation_looking_at;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_looks_down() {
        let adapter = OrientationAdapter::new(false);
        let sample = adapter.adapt(&Matrix3::identity(), &Vector3::zeros(), 0);

        assert_relative_eq!(sample.forward, Vector3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(sample.angular_rate, 0.0);
    }

    #[test]
    fn test_forward_follows_rotation() {
        let target = Vector3::new(0.3, -0.7, 0.2);
        let r = rotation_looking_at(&target).unwrap();
        let sample = OrientationAdapter::new(false).adapt(&r, &Vector3::zeros(), 10);

        assert_relative_eq!(sample.forward, target.normalize(), epsilon = 1e-9);
        assert_eq!(sample.timestamp_ns, 10);
    }

    #[test]
    fn test_angular_rate_is_gyro_norm() {
        let gyro = Vector3::new(0.03, 0.04, 0.12);
        let sample = OrientationAdapter::new(false).adapt(&Matrix3::identity(), &gyro, 0);
        assert_relative_eq!(sample.angular_rate, 0.13, epsilon = 1e-12);
    }

    #[test]
    fn test_landscape_remap_keeps_forward() {
        let r = rotation_from_vector(&[0.1, 0.4, -0.2]).unwrap();
        let plain = OrientationAdapter::new(false).adapt(&r, &Vector3::zeros(), 0);
        let remapped = OrientationAdapter::new(true).adapt(&r, &Vector3::zeros(), 0);

        assert_relative_eq!(plain.forward, remapped.forward, epsilon = 1e-12);
        assert!((plain.rotation - remapped.rotation).norm() > 1e-3);
    }

    #[test]
    fn test_invalid_rotation_vector() {
        let adapter = OrientationAdapter::new(true);
        assert!(adapter.adapt_rotation_vector(&[0.5], &Vector3::zeros(), 0).is_none());
    }
}
