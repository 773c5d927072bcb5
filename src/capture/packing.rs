//! Packing of YUV planes for the mosaic engine.

use serde::Deserialize;

use crate::camera::image::ImageBuffer;
use crate::error::{CaptureError, CaptureResult};

/// Order the chroma planes are appended after luma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneOrder {
    /// Y, then V, then U (NV21-style consumers).
    Yvu,
    /// Y, then U, then V.
    Yuv,
}

impl PlaneOrder {
    /// Plane indices in packing order, given planes stored as Y, U, V.
    fn indices(self) -> [usize; 3] {
        match self {
            Self::Yvu => [0, 2, 1],
            Self::Yuv => [0, 1, 2],
        }
    }
}

/// Concatenate the three planes of a YUV image into one buffer.
///
/// Plane bytes are copied as stored, row padding included.
pub fn pack_planes(image: &dyn ImageBuffer, order: PlaneOrder) -> CaptureResult<Vec<u8>> {
    if image.plane_count() < 3 {
        return Err(CaptureError::BufferExtraction(format!(
            "expected 3 planes, image has {}",
            image.plane_count()
        )));
    }

    let mut planes = Vec::with_capacity(3);
    for index in order.indices() {
        let plane = image.plane(index).ok_or_else(|| {
            CaptureError::BufferExtraction(format!("plane {} unavailable", index))
        })?;
        if plane.data.is_empty() {
            return Err(CaptureError::BufferExtraction(format!(
                "plane {} is empty",
                index
            )));
        }
        planes.push(plane.data);
    }

    let total = planes.iter().map(|p| p.len()).sum();
    let mut packed = Vec::with_capacity(total);
    for plane in planes {
        packed.extend_from_slice(plane);
    }
    Ok(packed)
}
