//! Image buffers delivered by stream readers.

use std::fmt;

/// Borrowed view of one image plane.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRef<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

/// A platform image. Must be closed exactly once to return its buffer.
pub trait ImageBuffer: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn timestamp_ns(&self) -> i64;

    fn plane_count(&self) -> usize;

    fn plane(&self, index: usize) -> Option<PlaneRef<'_>>;

    /// Return the buffer to its producer.
    fn close(&mut self);
}

/// Heap-backed plane.
#[derive(Debug, Clone)]
pub struct OwnedPlane {
    pub data: Vec<u8>,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

/// Release hook fired once when an [`OwnedImage`] is closed.
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Heap-backed [`ImageBuffer`], used by the virtual camera and in tests.
pub struct OwnedImage {
    width: u32,
    height: u32,
    timestamp_ns: i64,
    planes: Vec<OwnedPlane>,
    on_release: Option<ReleaseHook>,
    closed: bool,
}

impl OwnedImage {
    pub fn new(width: u32, height: u32, timestamp_ns: i64, planes: Vec<OwnedPlane>) -> Self {
        Self {
            width,
            height,
            timestamp_ns,
            planes,
            on_release: None,
            closed: false,
        }
    }

    /// Three-plane YUV 4:2:0 image with constant plane values.
    pub fn yuv420(width: u32, height: u32, timestamp_ns: i64, y: u8, u: u8, v: u8) -> Self {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let planes = vec![
            OwnedPlane {
                data: vec![y; w * h],
                row_stride: w,
                pixel_stride: 1,
            },
            OwnedPlane {
                data: vec![u; cw * ch],
                row_stride: cw,
                pixel_stride: 1,
            },
            OwnedPlane {
                data: vec![v; cw * ch],
                row_stride: cw,
                pixel_stride: 1,
            },
        ];
        Self::new(width, height, timestamp_ns, planes)
    }

    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for OwnedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_ns", &self.timestamp_ns)
            .field("planes", &self.planes.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl ImageBuffer for OwnedImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn plane(&self, index: usize) -> Option<PlaneRef<'_>> {
        self.planes.get(index).map(|p| PlaneRef {
            data: &p.data,
            row_stride: p.row_stride,
            pixel_stride: p.pixel_stride,
        })
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_yuv420_layout() {
        let image = OwnedImage::yuv420(4, 3, 7, 10, 20, 30);

        assert_eq!(image.plane_count(), 3);
        assert_eq!(image.plane(0).unwrap().data.len(), 12);
        assert_eq!(image.plane(1).unwrap().data, &[20; 4]);
        assert_eq!(image.plane(2).unwrap().row_stride, 2);
        assert!(image.plane(3).is_none());
        assert_eq!(image.timestamp_ns(), 7);
    }

    #[test]
    fn test_release_hook_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = count.clone();
        let mut image = OwnedImage::yuv420(2, 2, 0, 0, 0, 0).with_release_hook(move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });

        image.close();
        image.close();

        assert!(image.is_closed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
