pub mod camera;
pub mod inference;
pub mod rgba_converter;
pub mod sampler;
pub mod session;
pub mod worker;

pub use camera::{CameraDevice, DevicePosition, FrameOutputs, NokhwaSource, VideoSource};
pub use session::{CaptureController, CaptureSession, SessionStopper};
pub use worker::{FrameProcessor, PointSlot, start_worker};
