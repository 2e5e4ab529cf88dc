//! Teach-by-walking: recording a path between two nodes.
//!
//! The operator walks from the start node to the end node. Periodic samples
//! (embedding + compass heading) are recorded along the way, and the walk is
//! cut into segments at checkpoints where the operator picks a landmark and
//! the turn to take there. After review the session becomes a persisted path.

mod finalize;
mod landmark;
mod session;
mod suggestions;

pub use landmark::{CandidateLandmark, Landmark, LandmarkKind};
pub use session::{
    CheckpointCapture, PathRecordingSession, RecordingState, RecordingTarget, Segment, WalkSample,
};
pub use suggestions::{SuggestedCheckpoint, filter_suggestions};
