//! Matching live embeddings against the waypoints of one route.

use crate::core::{Embedding, Waypoint};

/// Best waypoint for a set of query embeddings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaypointHit {
    /// Position in the route's waypoint list.
    pub index: usize,
    pub sequence: u32,
    pub similarity: f32,
}

/// Compare every query against `waypoints[from..]` and return the single best
/// pair. Equal similarities go to the earlier waypoint.
///
/// Returns `None` when there are no queries or no remaining waypoints.
pub fn best_waypoint(queries: &[Embedding], waypoints: &[Waypoint], from: usize) -> Option<WaypointHit> {
    let mut best: Option<WaypointHit> = None;
    for (index, waypoint) in waypoints.iter().enumerate().skip(from) {
        for query in queries {
            let similarity = query.similarity(waypoint.embedding());
            if best.is_none_or(|b| similarity > b.similarity) {
                best = Some(WaypointHit {
                    index,
                    sequence: waypoint.sequence_number(),
                    similarity,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PathId, TurnDirection, WaypointDraft, WaypointId};

    fn route(vectors: &[[f32; 2]]) -> Vec<Waypoint> {
        vectors
            .iter()
            .enumerate()
            .map(|(i, v)| Waypoint {
                id: WaypointId(i as u64 + 1),
                path_id: PathId(1),
                data: WaypointDraft {
                    sequence_number: i as u32,
                    embedding: Embedding::new(v.to_vec()).unwrap(),
                    heading: 0.0,
                    heading_change: 0.0,
                    turn: TurnDirection::Straight,
                    is_decision_point: false,
                    landmark: None,
                    distance_from_previous_m: None,
                    timestamp_ms: 0,
                },
            })
            .collect()
    }

    #[test]
    fn test_only_remaining_waypoints_are_considered() {
        let waypoints = route(&[[1.0, 0.0], [0.7, 0.7], [0.0, 1.0]]);
        let query = [Embedding::new(vec![1.0, 0.0]).unwrap()];

        assert_eq!(best_waypoint(&query, &waypoints, 0).unwrap().index, 0);
        // Waypoint 0 is behind us, so the diagonal one wins
        assert_eq!(best_waypoint(&query, &waypoints, 1).unwrap().index, 1);
        assert!(best_waypoint(&query, &waypoints, 3).is_none());
    }

    #[test]
    fn test_best_over_several_queries() {
        let waypoints = route(&[[1.0, 0.0], [0.0, 1.0]]);
        let queries = [
            Embedding::new(vec![0.6, 0.4]).unwrap(),
            Embedding::new(vec![0.0, 1.0]).unwrap(),
        ];
        let hit = best_waypoint(&queries, &waypoints, 0).unwrap();
        assert_eq!(hit.index, 1);
        assert!(hit.similarity > 0.99);
    }

    #[test]
    fn test_tie_prefers_earlier_waypoint() {
        let waypoints = route(&[[1.0, 0.0], [1.0, 0.0]]);
        let query = [Embedding::new(vec![1.0, 0.0]).unwrap()];
        assert_eq!(best_waypoint(&query, &waypoints, 0).unwrap().index, 0);
    }
}
