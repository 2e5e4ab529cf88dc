//! Navigable routes from a node.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{NavigationPath, NodeId, PathId, Waypoint, validate_sequence};
use crate::error::{MargaError, Result};
use crate::store::PathStore;

/// A path ready for guidance: ordered waypoints plus display summaries.
#[derive(Debug, Clone)]
pub struct NavigationRoute {
    pub path: NavigationPath,
    /// Ordered by sequence number, never empty.
    pub waypoints: Vec<Waypoint>,
    pub start_name: String,
    pub end_name: String,
    /// e.g. "45 m", "1.2 km"
    pub distance_text: String,
    /// e.g. "< 1 min", "3 min"
    pub duration_text: String,
}

impl NavigationRoute {
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Heading of the first waypoint, the direction to face before walking.
    pub fn first_heading(&self) -> Option<f32> {
        self.waypoints.first().map(Waypoint::heading)
    }

    /// A route can be followed when it has waypoints in `0..n-1` order.
    pub fn validate(&self) -> Result<()> {
        if self.waypoints.is_empty() {
            return Err(MargaError::InvalidRecord(format!(
                "path {} has no waypoints",
                self.path.id
            )));
        }
        validate_sequence(self.waypoints.iter().map(Waypoint::sequence_number))
    }
}

/// Authorization collaborator deciding who may follow which path.
pub trait AccessPolicy: Send + Sync {
    fn can_navigate(&self, user: Option<&str>, path: &NavigationPath) -> bool;
}

/// Policy that lets everyone follow every path.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_navigate(&self, _user: Option<&str>, _path: &NavigationPath) -> bool {
        true
    }
}

/// Looks up and hydrates routes from the store.
pub struct RouteMatcher {
    store: Arc<dyn PathStore>,
    policy: Arc<dyn AccessPolicy>,
    walking_speed_mps: f32,
}

impl RouteMatcher {
    pub fn new(store: Arc<dyn PathStore>, walking_speed_mps: f32) -> Self {
        Self {
            store,
            policy: Arc::new(AllowAll),
            walking_speed_mps,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Every route starting at `node`, shortest first.
    pub fn available_routes(&self, node: NodeId) -> Result<Vec<NavigationRoute>> {
        self.routes_from(node, None)
    }

    /// Same as [`available_routes`](Self::available_routes), filtered for `user`.
    pub fn available_routes_for(&self, user: &str, node: NodeId) -> Result<Vec<NavigationRoute>> {
        self.routes_from(node, Some(user))
    }

    /// Hydrate one path. Unlike the listing, a broken path is an error here.
    pub fn route(&self, path_id: PathId) -> Result<NavigationRoute> {
        let path = self.store.path(path_id)?;
        self.hydrate(path)
    }

    fn routes_from(&self, node: NodeId, user: Option<&str>) -> Result<Vec<NavigationRoute>> {
        let mut routes = Vec::new();
        for path in self.store.paths_from(node)? {
            if !self.policy.can_navigate(user, &path) {
                debug!("Path {} hidden from {:?}", path.id, user);
                continue;
            }
            let id = path.id;
            match self.hydrate(path) {
                Ok(route) => routes.push(route),
                Err(e) => warn!("Skipping path {}: {}", id, e),
            }
        }
        routes.sort_by(|a, b| {
            a.path
                .estimated_distance_m
                .total_cmp(&b.path.estimated_distance_m)
                .then_with(|| a.path.name.cmp(&b.path.name))
        });
        debug!("{} routes from node {}", routes.len(), node);
        Ok(routes)
    }

    fn hydrate(&self, path: NavigationPath) -> Result<NavigationRoute> {
        let waypoints = self.store.waypoints(path.id)?;
        if waypoints.is_empty() {
            return Err(MargaError::InvalidRecord(format!(
                "path {} has no waypoints",
                path.id
            )));
        }
        validate_sequence(waypoints.iter().map(Waypoint::sequence_number))?;

        let start_name = self.store.node(path.start_node)?.name;
        let end_name = self.store.node(path.end_node)?.name;
        Ok(NavigationRoute {
            distance_text: format_distance(path.estimated_distance_m),
            duration_text: format_duration(path.estimated_distance_m, self.walking_speed_mps),
            path,
            waypoints,
            start_name,
            end_name,
        })
    }
}

/// "{:.0} m" below a kilometre, "{:.1} km" from there.
pub fn format_distance(meters: f32) -> String {
    if meters < 1000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

/// Walking time at `speed_mps`, rounded up to whole minutes.
pub fn format_duration(meters: f32, speed_mps: f32) -> String {
    let seconds = if speed_mps > 0.0 { meters / speed_mps } else { 0.0 };
    if seconds < 60.0 {
        "< 1 min".to_string()
    } else {
        format!("{} min", (seconds / 60.0).ceil() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Embedding, MapId, PathDraft, TurnDirection, WaypointDraft};
    use crate::store::MemoryStore;

    struct OnlyShort;

    impl AccessPolicy for OnlyShort {
        fn can_navigate(&self, user: Option<&str>, path: &NavigationPath) -> bool {
            user == Some("admin") || path.estimated_distance_m < 10.0
        }
    }

    fn draft(map: MapId, from: NodeId, to: NodeId, name: &str, distance: f32) -> PathDraft {
        PathDraft {
            map_id: map,
            name: name.into(),
            start_node: from,
            end_node: to,
            estimated_distance_m: distance,
            estimated_steps: (distance / 0.65) as u32,
            waypoints: vec![WaypointDraft {
                sequence_number: 0,
                embedding: Embedding::new(vec![1.0, 0.0]).unwrap(),
                heading: 45.0,
                heading_change: 0.0,
                turn: TurnDirection::Straight,
                is_decision_point: true,
                landmark: None,
                distance_from_previous_m: None,
                timestamp_ms: 0,
            }],
        }
    }

    fn setup() -> (Arc<MemoryStore>, NodeId) {
        let store = Arc::new(MemoryStore::new());
        let map = store.add_map("Office").unwrap();
        let lobby = store.add_node(map, "Lobby", 0.0, 0.0, None).unwrap();
        let lab = store.add_node(map, "Lab", 1.0, 0.0, None).unwrap();
        let cafe = store.add_node(map, "Cafe", 2.0, 0.0, None).unwrap();
        store.insert_path(draft(map, lobby, cafe, "Lobby to Cafe", 80.0)).unwrap();
        store.insert_path(draft(map, lobby, lab, "Lobby to Lab", 6.2)).unwrap();
        store.insert_path(draft(map, lab, cafe, "Lab to Cafe", 70.0)).unwrap();
        (store, lobby)
    }

    #[test]
    fn test_routes_sorted_by_distance() {
        let (store, lobby) = setup();
        let matcher = RouteMatcher::new(store, 1.2);
        let routes = matcher.available_routes(lobby).unwrap();

        let names: Vec<&str> = routes.iter().map(|r| r.path.name.as_str()).collect();
        assert_eq!(names, vec!["Lobby to Lab", "Lobby to Cafe"]);
        assert_eq!(routes[0].end_name, "Lab");
        assert_eq!(routes[0].distance_text, "6 m");
        assert_eq!(routes[1].duration_text, "2 min");
        assert_eq!(routes[0].first_heading(), Some(45.0));
    }

    #[test]
    fn test_no_routes_is_empty_not_error() {
        let (store, _) = setup();
        let map = store.maps().unwrap()[0].id;
        let isolated = store.add_node(map, "Roof", 0.0, 0.0, None).unwrap();
        let matcher = RouteMatcher::new(store, 1.2);
        assert!(matcher.available_routes(isolated).unwrap().is_empty());
    }

    #[test]
    fn test_access_policy_filters() {
        let (store, lobby) = setup();
        let matcher = RouteMatcher::new(store, 1.2).with_policy(Arc::new(OnlyShort));
        assert_eq!(matcher.available_routes_for("guest", lobby).unwrap().len(), 1);
        assert_eq!(matcher.available_routes_for("admin", lobby).unwrap().len(), 2);
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(0.0), "0 m");
        assert_eq!(format_distance(45.4), "45 m");
        assert_eq!(format_distance(1260.0), "1.3 km");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(50.0, 1.2), "< 1 min");
        assert_eq!(format_duration(60.0, 1.0), "1 min");
        assert_eq!(format_duration(61.0, 1.0), "2 min");
        assert_eq!(format_duration(10.0, 0.0), "< 1 min");
    }
}
