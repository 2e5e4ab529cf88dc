//! Checkpoint landmarks and detector candidates.

use crate::core::{BoundingBox, Detection, Frame};
use crate::error::{MargaError, Result};

/// Where a landmark came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkKind {
    /// Picked from the object detector's output.
    Detected,
    /// Region drawn by the operator.
    Custom,
}

/// Object chosen to mark a checkpoint.
#[derive(Debug, Clone)]
pub struct Landmark {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub kind: LandmarkKind,
    /// Frame the landmark was chosen on.
    pub frame: Option<Frame>,
    /// Relative step count when the frame was captured.
    pub step_count: u64,
    pub distance_m: f32,
}

impl Landmark {
    pub fn detected(detection: &Detection, frame: Option<Frame>, step_count: u64, distance_m: f32) -> Self {
        Self {
            label: detection.label.clone(),
            confidence: detection.confidence,
            bbox: detection.bbox,
            kind: LandmarkKind::Detected,
            frame,
            step_count,
            distance_m,
        }
    }

    /// Operator-drawn landmark. Always full confidence.
    pub fn custom(
        label: &str,
        bbox: BoundingBox,
        frame: Option<Frame>,
        step_count: u64,
        distance_m: f32,
    ) -> Result<Self> {
        let label = label.trim();
        if label.is_empty() {
            return Err(MargaError::InvalidRecord("custom landmark needs a label".into()));
        }
        Ok(Self {
            label: label.to_string(),
            confidence: 1.0,
            bbox,
            kind: LandmarkKind::Custom,
            frame,
            step_count,
            distance_m,
        })
    }
}

/// Raw detector output seen while walking, tagged with where it was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLandmark {
    pub detection: Detection,
    pub step_count: u64,
    pub distance_m: f32,
}
