//! Suggested checkpoints from detector output seen while walking.
//!
//! The detector runs on every sample, so the same door shows up in many
//! consecutive frames. Filtering keeps only confident candidates and
//! collapses candidates that are close together along the walk into the
//! single most confident one.

use crate::core::BoundingBox;

use super::landmark::CandidateLandmark;

/// A landmark the operator may add as an extra checkpoint when finalizing.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestedCheckpoint {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub step_count: u64,
    pub distance_m: f32,
}

impl From<&CandidateLandmark> for SuggestedCheckpoint {
    fn from(c: &CandidateLandmark) -> Self {
        Self {
            label: c.detection.label.clone(),
            confidence: c.detection.confidence,
            bbox: c.detection.bbox,
            step_count: c.step_count,
            distance_m: c.distance_m,
        }
    }
}

/// Filter and de-duplicate candidates.
///
/// Candidates below `min_confidence` are dropped. The rest are grouped by
/// walk distance: a group starts at its first candidate and takes every
/// candidate less than `min_spacing_m` further along. Each group yields its
/// most confident member (earliest on ties). Output is ordered by distance.
pub fn filter_suggestions(
    candidates: &[CandidateLandmark],
    min_confidence: f32,
    min_spacing_m: f32,
) -> Vec<SuggestedCheckpoint> {
    let mut confident: Vec<&CandidateLandmark> = candidates
        .iter()
        .filter(|c| c.detection.confidence >= min_confidence)
        .collect();
    // Stable sort keeps detection order within equal distances
    confident.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

    let mut kept: Vec<SuggestedCheckpoint> = Vec::new();
    let mut group_start: Option<f32> = None;
    for candidate in confident {
        match group_start {
            Some(start) if candidate.distance_m - start < min_spacing_m => {
                if let Some(best) = kept.last_mut()
                    && candidate.detection.confidence > best.confidence
                {
                    *best = SuggestedCheckpoint::from(candidate);
                }
            }
            _ => {
                group_start = Some(candidate.distance_m);
                kept.push(SuggestedCheckpoint::from(candidate));
            }
        }
    }
    kept
}
