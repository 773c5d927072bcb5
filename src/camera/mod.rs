//! Camera acquisition: platform abstraction, stream negotiation, session
//! lifecycle and the frames it produces.

pub mod backend;
pub mod frame;
pub mod image;
pub mod negotiation;
pub mod session;
pub mod state;
pub mod virtual_camera;

pub use backend::{
    CameraBackend, CameraDevice, CaptureRequest, CaptureSession, DeviceEvent, FrameCallback,
    OutputId, OutputSpec, RequestTemplate, Size, StreamFormat, StreamReader,
};
pub use frame::{FrameView, QueuedFrame};
pub use image::{ImageBuffer, OwnedImage, OwnedPlane, PlaneRef};
pub use negotiation::{choose_optimal_size, size_score};
pub use session::{CameraSession, NegotiatedStreams};
pub use state::CaptureSessionState;
pub use virtual_camera::{CameraCall, FramePump, SessionFailure, VirtualCamera};
