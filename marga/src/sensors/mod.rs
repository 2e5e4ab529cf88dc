//! Phone sensors: pedometer dead reckoning and the sensor collaborator seam.
//!
//! Step counts and compass headings are pushed into the recording session and
//! navigation state machine by the host application. The only pull-style
//! access is the baseline read at the start of a recording.

mod steps;

pub use steps::StepTracker;

use crate::error::Result;

/// Pedometer collaborator.
pub trait StepCounter: Send + Sync {
    /// Current raw cumulative step count.
    ///
    /// Fails with `MargaError::SensorUnavailable` when the pedometer cannot
    /// be read (missing permission, no hardware).
    fn current_steps(&self) -> Result<u64>;
}
