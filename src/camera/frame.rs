//! Frames travelling through the queue.

use std::fmt;

use crate::camera::image::ImageBuffer;
use crate::error::{CaptureError, CaptureResult};

/// Borrowed tracking input: luma plane plus geometry.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub luma: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub timestamp_s: f64,
}

/// A delivered camera frame with exactly one owner.
///
/// Ownership moves producer → queue → consumer → retained slot. Whoever drops
/// it releases the underlying image, so release happens exactly once.
pub struct QueuedFrame {
    image: Box<dyn ImageBuffer>,
    width: u32,
    height: u32,
    row_stride: usize,
    timestamp_ns: i64,
}

impl QueuedFrame {
    /// Wrap a delivered image. An image without a usable luma plane is
    /// released immediately and reported as an acquisition failure.
    pub fn from_image(mut image: Box<dyn ImageBuffer>) -> CaptureResult<Self> {
        let row_stride = match image.plane(0) {
            Some(plane) if !plane.data.is_empty() => plane.row_stride,
            _ => {
                let timestamp_ns = image.timestamp_ns();
                image.close();
                return Err(CaptureError::FrameAcquisition(format!(
                    "frame at {} ns has no luma plane",
                    timestamp_ns
                )));
            }
        };

        Ok(Self {
            width: image.width(),
            height: image.height(),
            timestamp_ns: image.timestamp_ns(),
            row_stride,
            image,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    pub fn image(&self) -> &dyn ImageBuffer {
        self.image.as_ref()
    }

    /// Tracking view of this frame.
    pub fn view(&self) -> FrameView<'_> {
        let luma = self.image.plane(0).map(|p| p.data).unwrap_or(&[]);
        FrameView {
            luma,
            width: self.width,
            height: self.height,
            row_stride: self.row_stride,
            timestamp_s: self.timestamp_ns as f64 * 1e-9,
        }
    }

    /// Release the image now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for QueuedFrame {
    fn drop(&mut self) {
        self.image.close();
    }
}

impl fmt::Debug for QueuedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("row_stride", &self.row_stride)
            .field("timestamp_ns", &self.timestamp_ns)
            .finish()
    }
}
