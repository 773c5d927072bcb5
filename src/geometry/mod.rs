//! Geometry utilities: rotation decoding, axis remaps, view matrices.

pub mod rotation;

pub use rotation::{
    angle_between, remap_landscape, rotation_from_homogeneous, rotation_from_vector,
    rotation_looking_at, view_matrix,
};
