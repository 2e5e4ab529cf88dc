//! Turn-by-turn instruction text.

use super::state::NavigationInstruction;
use crate::core::TurnDirection;
use crate::routes::NavigationRoute;

/// Instruction leading from waypoint `current` to the next one.
///
/// At the final waypoint the instruction announces arrival.
pub fn instruction_for(route: &NavigationRoute, current: usize) -> NavigationInstruction {
    let total = route.len();
    let next = (current + 1).min(total.saturating_sub(1));

    let text = if total == 0 {
        String::new()
    } else if current + 1 >= total {
        format!("You have arrived at {}", route.end_name)
    } else {
        let waypoint = &route.waypoints[next].data;
        match (waypoint.is_decision_point, waypoint.turn) {
            (true, TurnDirection::Left | TurnDirection::Right) => {
                let dir = waypoint.turn.as_str();
                match waypoint.landmark.as_deref() {
                    Some(landmark) => format!("Turn {} at {}", dir, landmark),
                    None => format!("Turn {}", dir),
                }
            }
            (true, TurnDirection::UTurn) => "Turn around".to_string(),
            _ => "Continue straight".to_string(),
        }
    };

    NavigationInstruction {
        text,
        waypoint_index: next + 1,
        total_waypoints: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        Embedding, MapId, NavigationPath, NodeId, PathId, Waypoint, WaypointDraft, WaypointId,
    };

    fn waypoint(i: u32, decision: bool, turn: TurnDirection, landmark: Option<&str>) -> Waypoint {
        Waypoint {
            id: WaypointId(i as u64 + 1),
            path_id: PathId(1),
            data: WaypointDraft {
                sequence_number: i,
                embedding: Embedding::new(vec![1.0, 0.0]).unwrap(),
                heading: 0.0,
                heading_change: 0.0,
                turn,
                is_decision_point: decision,
                landmark: landmark.map(str::to_string),
                distance_from_previous_m: None,
                timestamp_ms: 0,
            },
        }
    }

    fn route(waypoints: Vec<Waypoint>) -> NavigationRoute {
        NavigationRoute {
            path: NavigationPath {
                id: PathId(1),
                map_id: MapId(1),
                name: "Lobby to Lab".into(),
                start_node: NodeId(1),
                end_node: NodeId(2),
                estimated_distance_m: 10.0,
                estimated_steps: 15,
                created_at_ms: 0,
            },
            waypoints,
            start_name: "Lobby".into(),
            end_name: "Lab".into(),
            distance_text: "10 m".into(),
            duration_text: "< 1 min".into(),
        }
    }

    #[test]
    fn test_turn_at_landmark() {
        let r = route(vec![
            waypoint(0, false, TurnDirection::Straight, None),
            waypoint(1, true, TurnDirection::Left, Some("Door")),
            waypoint(2, true, TurnDirection::Right, None),
            waypoint(3, true, TurnDirection::UTurn, None),
            waypoint(4, false, TurnDirection::Left, None),
            waypoint(5, true, TurnDirection::Straight, Some("Desk")),
        ]);

        let first = instruction_for(&r, 0);
        assert_eq!(first.text, "Turn left at Door");
        assert_eq!(first.waypoint_index, 2);
        assert_eq!(first.total_waypoints, 6);

        assert_eq!(instruction_for(&r, 1).text, "Turn right");
        assert_eq!(instruction_for(&r, 2).text, "Turn around");
        // Turns outside decision points are walking noise
        assert_eq!(instruction_for(&r, 3).text, "Continue straight");
        assert_eq!(instruction_for(&r, 4).text, "Continue straight");
        assert_eq!(instruction_for(&r, 5).text, "You have arrived at Lab");
        assert_eq!(instruction_for(&r, 5).waypoint_index, 6);
    }

    #[test]
    fn test_arrival_at_last_waypoint() {
        let r = route(vec![waypoint(0, true, TurnDirection::Straight, None)]);
        let ins = instruction_for(&r, 0);
        assert_eq!(ins.text, "You have arrived at Lab");
        assert_eq!(ins.waypoint_index, 1);
    }
}
