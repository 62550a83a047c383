pub mod acquisition;
pub mod capture;
pub mod frame;
pub mod operator;
pub mod readiness;


pub use acquisition::{LocalControl, VideoAcquisitionWorker, VideoError, WorkerExit};
pub use capture::{CaptureError, PictureCapture, SavedImage};
pub use frame::{Frame, FrameSlot};
pub use readiness::ReadinessGate;
