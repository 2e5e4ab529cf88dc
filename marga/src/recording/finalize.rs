//! Turning a reviewed walk into a path draft.
//!
//! Each segment contributes the samples recorded while walking it, in
//! recording order, followed by its checkpoint as a decision point. The
//! segments therefore map onto contiguous waypoint ranges and sequence
//! numbers come out as `0..n-1`.

use tracing::debug;

use super::session::{RecordingTarget, Segment, WalkSample, segment_totals};
use super::suggestions::SuggestedCheckpoint;
use crate::config::RecordingConfig;
use crate::core::{Embedding, PathDraft, TurnDirection, WaypointDraft, signed_heading_change};
use crate::error::{MargaError, Result};
use crate::utils::round_cm;

struct PendingWaypoint<'a> {
    embedding: &'a Embedding,
    heading: f32,
    distance_m: f32,
    timestamp_ms: u64,
    /// Landmark label and turn action for checkpoint waypoints.
    checkpoint: Option<(&'a str, TurnDirection)>,
}

pub(crate) fn build_path(
    target: &RecordingTarget,
    samples: &[WalkSample],
    segments: &[Segment],
    selected: &[SuggestedCheckpoint],
    config: &RecordingConfig,
) -> Result<PathDraft> {
    if segments.is_empty() {
        return Err(MargaError::EmptySession);
    }

    let mut pending = Vec::with_capacity(samples.len() + segments.len());
    let mut cumulative = 0.0f32;
    for (i, segment) in segments.iter().enumerate() {
        pending.extend(samples.iter().filter(|s| s.segment == i).map(|s| PendingWaypoint {
            embedding: &s.embedding,
            heading: s.heading,
            distance_m: s.distance_m,
            timestamp_ms: s.timestamp_ms,
            checkpoint: None,
        }));
        cumulative += segment.distance_m;
        pending.push(PendingWaypoint {
            embedding: &segment.checkpoint.embedding,
            heading: segment.checkpoint.heading,
            distance_m: cumulative,
            timestamp_ms: segment.checkpoint.timestamp_ms,
            checkpoint: Some((segment.landmark.label.as_str(), segment.turn)),
        });
    }
    let trailing = samples.iter().filter(|s| s.segment >= segments.len()).count();
    if trailing > 0 {
        debug!("Dropping {} samples recorded after the last checkpoint", trailing);
    }

    let mut waypoints: Vec<WaypointDraft> = Vec::with_capacity(pending.len());
    let mut distances: Vec<f32> = Vec::with_capacity(pending.len());
    for (sequence, point) in pending.iter().enumerate() {
        let previous = waypoints.last().map(|w| w.heading).zip(distances.last().copied());
        let heading_change = previous.map_or(0.0, |(h, _)| signed_heading_change(h, point.heading));
        let (turn, landmark) = match point.checkpoint {
            Some((label, turn)) => (turn, Some(label.to_string())),
            None => (
                TurnDirection::classify(
                    heading_change,
                    config.straight_threshold_deg,
                    config.u_turn_threshold_deg,
                ),
                None,
            ),
        };
        waypoints.push(WaypointDraft {
            sequence_number: sequence as u32,
            embedding: point.embedding.clone(),
            heading: point.heading,
            heading_change,
            turn,
            is_decision_point: point.checkpoint.is_some(),
            landmark,
            distance_from_previous_m: previous
                .map(|(_, d)| round_cm((point.distance_m - d).max(0.0))),
            timestamp_ms: point.timestamp_ms,
        });
        distances.push(point.distance_m);
    }

    for suggestion in selected {
        annotate_nearest(&mut waypoints, &distances, suggestion);
    }

    let (steps, distance_m) = segment_totals(segments);
    let draft = PathDraft {
        map_id: target.map_id,
        name: target.name.clone(),
        start_node: target.start_node,
        end_node: target.end_node,
        estimated_distance_m: distance_m,
        estimated_steps: u32::try_from(steps).unwrap_or(u32::MAX),
        waypoints,
    };
    draft.validate()?;
    Ok(draft)
}

/// Mark the waypoint closest in walk distance to `suggestion` as a decision
/// point. Waypoints that already carry a landmark are left alone.
fn annotate_nearest(waypoints: &mut [WaypointDraft], distances: &[f32], suggestion: &SuggestedCheckpoint) {
    let nearest = distances
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - suggestion.distance_m)
                .abs()
                .total_cmp(&(*b - suggestion.distance_m).abs())
        })
        .map(|(i, _)| i);
    let Some(i) = nearest else {
        return;
    };
    let waypoint = &mut waypoints[i];
    if waypoint.landmark.is_some() {
        debug!(
            "Suggestion '{}' skipped: waypoint {} already has a landmark",
            suggestion.label, waypoint.sequence_number
        );
        return;
    }
    waypoint.landmark = Some(suggestion.label.clone());
    waypoint.is_decision_point = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BoundingBox, MapId, NodeId};
    use crate::recording::landmark::Landmark;
    use crate::recording::session::CheckpointCapture;

    fn emb(x: f32) -> Embedding {
        Embedding::new(vec![1.0, x]).unwrap()
    }

    fn sample(segment: usize, steps: u64, heading: f32) -> WalkSample {
        WalkSample {
            embedding: emb(steps as f32),
            heading,
            step_count: steps,
            distance_m: steps as f32 * 0.65,
            timestamp_ms: steps * 1000,
            segment,
        }
    }

    fn segment(start: u64, end: u64, label: &str, turn: TurnDirection, heading: f32) -> Segment {
        let bbox = BoundingBox::new(0.0, 0.0, 0.5, 0.5).unwrap();
        Segment {
            start_steps: start,
            end_steps: end,
            distance_m: (end - start) as f32 * 0.65,
            landmark: Landmark::custom(label, bbox, None, end, end as f32 * 0.65).unwrap(),
            turn,
            checkpoint: CheckpointCapture {
                embedding: emb(100.0),
                heading,
                timestamp_ms: end * 1000,
            },
        }
    }

    fn target() -> RecordingTarget {
        RecordingTarget {
            map_id: MapId(1),
            start_node: NodeId(1),
            end_node: NodeId(2),
            name: "A to B".into(),
        }
    }

    #[test]
    fn test_segments_become_contiguous_ranges() {
        let samples = vec![
            sample(0, 0, 0.0),
            sample(0, 4, 10.0),
            sample(1, 12, 95.0),
            sample(2, 20, 95.0),
        ];
        let segments = vec![
            segment(0, 8, "Door", TurnDirection::Right, 5.0),
            segment(8, 16, "Stairs", TurnDirection::Left, 90.0),
        ];
        let draft = build_path(&target(), &samples, &segments, &[], &RecordingConfig::default())
            .unwrap();

        // 2 + checkpoint, 1 + checkpoint; the trailing sample is dropped
        assert_eq!(draft.waypoints.len(), 5);
        let decision: Vec<bool> = draft.waypoints.iter().map(|w| w.is_decision_point).collect();
        assert_eq!(decision, vec![false, false, true, false, true]);
        assert_eq!(draft.waypoints[2].landmark.as_deref(), Some("Door"));
        assert_eq!(draft.waypoints[2].turn, TurnDirection::Right);
        assert_eq!(draft.estimated_steps, 16);
        assert!((draft.estimated_distance_m - 10.4).abs() < 1e-4);
    }

    #[test]
    fn test_turns_classified_from_heading_change() {
        let samples = vec![
            sample(0, 0, 350.0),
            sample(0, 2, 10.0),
            sample(0, 4, 280.0),
            sample(0, 6, 100.0),
        ];
        let segments = vec![segment(0, 8, "Door", TurnDirection::Straight, 100.0)];
        let draft = build_path(&target(), &samples, &segments, &[], &RecordingConfig::default())
            .unwrap();

        let w = &draft.waypoints;
        assert_eq!(w[0].heading_change, 0.0);
        assert!(w[0].distance_from_previous_m.is_none());
        assert!((w[1].heading_change - 20.0).abs() < 1e-4);
        assert_eq!(w[1].turn, TurnDirection::Straight);
        assert!((w[2].heading_change + 90.0).abs() < 1e-4);
        assert_eq!(w[2].turn, TurnDirection::Left);
        assert!((w[3].heading_change - 180.0).abs() < 1e-4);
        assert_eq!(w[3].turn, TurnDirection::UTurn);
        assert_eq!(w[1].distance_from_previous_m, Some(1.3));
    }

    #[test]
    fn test_selected_suggestion_annotates_nearest_waypoint() {
        let samples = vec![sample(0, 0, 0.0), sample(0, 5, 0.0), sample(0, 10, 0.0)];
        let segments = vec![segment(0, 12, "Door", TurnDirection::Left, 0.0)];
        let suggestion = SuggestedCheckpoint {
            label: "Vending machine".into(),
            confidence: 0.9,
            bbox: BoundingBox::new(0.0, 0.0, 0.2, 0.2).unwrap(),
            step_count: 6,
            distance_m: 3.9,
        };
        let draft = build_path(
            &target(),
            &samples,
            &segments,
            &[suggestion],
            &RecordingConfig::default(),
        )
        .unwrap();

        assert_eq!(draft.waypoints[1].landmark.as_deref(), Some("Vending machine"));
        assert!(draft.waypoints[1].is_decision_point);
        // Checkpoint landmarks are never overwritten
        assert_eq!(draft.waypoints[3].landmark.as_deref(), Some("Door"));
    }

    #[test]
    fn test_no_segments_is_empty_session() {
        let result = build_path(&target(), &[], &[], &[], &RecordingConfig::default());
        assert!(matches!(result, Err(MargaError::EmptySession)));
    }
}
