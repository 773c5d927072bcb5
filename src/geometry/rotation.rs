//! Rotation helpers for device orientation.
//!
//! Rotation matrices here map device coordinates into the world frame
//! (`v_world = R * v_device`), world Z up. The camera looks along the
//! device's -Z axis.

use nalgebra::{Matrix3, Matrix4, Quaternion, UnitQuaternion, Vector3};

/// Vectors shorter than this are treated as zero.
const EPSILON: f64 = 1e-9;

/// Decodes a platform rotation vector `[x, y, z]` or `[x, y, z, w]` into a
/// rotation matrix.
///
/// The vector holds the imaginary part of a unit quaternion. When the scalar
/// part is absent it is recovered as `sqrt(max(0, 1 - x² - y² - z²))`.
/// Returns `None` for fewer than three components or a degenerate quaternion.
pub fn rotation_from_vector(values: &[f64]) -> Option<Matrix3<f64>> {
    if values.len() < 3 {
        return None;
    }
    let (x, y, z) = (values[0], values[1], values[2]);
    let w = match values.get(3) {
        Some(&w) => w,
        None => (1.0 - x * x - y * y - z * z).max(0.0).sqrt(),
    };

    let q = Quaternion::new(w, x, y, z);
    if q.norm() < EPSILON {
        return None;
    }
    Some(
        UnitQuaternion::from_quaternion(q)
            .to_rotation_matrix()
            .into_inner(),
    )
}

/// Remaps device axes for a phone held in landscape: the new device X axis is
/// the old Y axis and the new Y axis is the old -X axis. Z is unchanged.
///
/// ```text
/// R' = R * [e_y, -e_x, e_z]
/// ```
pub fn remap_landscape(r: &Matrix3<f64>) -> Matrix3<f64> {
    Matrix3::from_columns(&[r.column(1).into_owned(), -r.column(0), r.column(2).into_owned()])
}

/// Homogeneous 4x4 view of a rotation, as pushed to the renderer.
pub fn view_matrix(r: &Matrix3<f64>) -> Matrix4<f64> {
    r.to_homogeneous()
}

/// Extracts the upper-left 3x3 rotation block of a homogeneous matrix.
pub fn rotation_from_homogeneous(m: &Matrix4<f64>) -> Matrix3<f64> {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Angle in radians between two vectors, robust to rounding past ±1.
///
/// Returns `None` if either vector is (near) zero.
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> Option<f64> {
    let (na, nb) = (a.norm(), b.norm());
    if na < EPSILON || nb < EPSILON {
        return None;
    }
    let cos = a.dot(b) / (na * nb);
    Some(cos.clamp(-1.0, 1.0).acos())
}

/// Builds a device-to-world rotation whose camera (device -Z) looks along
/// `forward`, keeping the device X axis horizontal where possible.
pub fn rotation_looking_at(forward: &Vector3<f64>) -> Option<Matrix3<f64>> {
    let f = forward.try_normalize(EPSILON)?;
    let z_axis = -f;

    // Looking straight up or down: world Z no longer defines a horizon.
    let up = if z_axis.z.abs() > 1.0 - 1e-6 {
        Vector3::y()
    } else {
        Vector3::z()
    };

    let x_axis = up.cross(&z_axis).try_normalize(EPSILON)?;
    let y_axis = z_axis.cross(&x_axis);
    Some(Matrix3::from_columns(&[x_axis, y_axis, z_axis]))
}
