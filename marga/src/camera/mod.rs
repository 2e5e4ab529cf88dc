//! Camera access: the exclusive-capture gatekeeper and periodic sampling.

mod coordinator;
mod scheduler;

pub use coordinator::{
    CameraAccessCoordinator, CameraLease, CaptureError, CapturePurpose, CaptureStats, FrameSource,
};
pub use scheduler::PeriodicCapture;
