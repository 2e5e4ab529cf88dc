//! In-process [`PathStore`] with JSON snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::rows::{ConnectionRow, MapRow, NodeRow, PathRow, PlaceEmbeddingRow, WaypointRow};
use super::{NavigationLogEntry, PathStore, WalkingSessionRecord};
use crate::core::{
    CardinalDirection, Connection, ConnectionId, Embedding, Map, MapId, NavigationPath, Node,
    NodeId, PathDraft, PathId, PlaceEmbedding, PlaceEmbeddingId, Waypoint, WaypointId,
    validate_sequence,
};
use crate::error::{MargaError, Result};
use crate::utils::now_ms;

/// Serialized form of a [`MemoryStore`]: one list of rows per table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub maps: Vec<MapRow>,
    #[serde(default)]
    pub map_nodes: Vec<NodeRow>,
    #[serde(default)]
    pub place_embeddings: Vec<PlaceEmbeddingRow>,
    #[serde(default)]
    pub node_connections: Vec<ConnectionRow>,
    #[serde(default)]
    pub navigation_paths: Vec<PathRow>,
    #[serde(default)]
    pub path_waypoints: Vec<WaypointRow>,
    #[serde(default)]
    pub walking_sessions: Vec<WalkingSessionRecord>,
    #[serde(default)]
    pub navigation_logs: Vec<NavigationLogEntry>,
}

#[derive(Default)]
struct Tables {
    maps: BTreeMap<MapId, Map>,
    nodes: BTreeMap<NodeId, Node>,
    places: Vec<PlaceEmbedding>,
    connections: Vec<Connection>,
    paths: BTreeMap<PathId, NavigationPath>,
    /// Keyed by path, each list ordered by sequence number.
    waypoints: BTreeMap<PathId, Vec<Waypoint>>,
    walking_sessions: Vec<WalkingSessionRecord>,
    navigation_logs: Vec<NavigationLogEntry>,
    /// Shared id counter for every table.
    next_id: u64,
}

impl Tables {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_node_on_map(&self, node: NodeId, map: MapId) -> Result<&Node> {
        let found = self
            .nodes
            .get(&node)
            .ok_or_else(|| MargaError::NotFound(format!("node {}", node)))?;
        if found.map_id != map {
            return Err(MargaError::InvalidRecord(format!(
                "node {} belongs to map {}, not map {}",
                node, found.map_id, map
            )));
        }
        Ok(found)
    }
}

/// Thread-safe in-memory store.
///
/// Readers never observe a half-inserted path: `insert_path` validates the
/// whole draft first and publishes it under a single write lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_map(&self, name: &str) -> Result<MapId> {
        let mut t = self.tables.write();
        let id = MapId(t.allocate());
        let map = Map::new(id, name, now_ms())?;
        t.maps.insert(id, map);
        Ok(id)
    }

    pub fn add_node(
        &self,
        map: MapId,
        name: &str,
        x: f32,
        y: f32,
        reference_heading: Option<f32>,
    ) -> Result<NodeId> {
        let mut t = self.tables.write();
        if !t.maps.contains_key(&map) {
            return Err(MargaError::NotFound(format!("map {}", map)));
        }
        let id = NodeId(t.allocate());
        let node = Node::new(id, map, name, x, y, reference_heading)?;
        t.nodes.insert(id, node);
        Ok(id)
    }

    pub fn add_place_embedding(
        &self,
        node: NodeId,
        direction: Option<CardinalDirection>,
        embedding: Embedding,
    ) -> Result<PlaceEmbeddingId> {
        let mut t = self.tables.write();
        if !t.nodes.contains_key(&node) {
            return Err(MargaError::NotFound(format!("node {}", node)));
        }
        let id = PlaceEmbeddingId(t.allocate());
        t.places.push(PlaceEmbedding {
            id,
            node_id: node,
            direction,
            embedding,
        });
        Ok(id)
    }

    /// Insert a connection; the `id` field of the argument is replaced.
    pub fn add_connection(&self, mut connection: Connection) -> Result<ConnectionId> {
        connection.validate()?;
        let mut t = self.tables.write();
        t.require_node_on_map(connection.from, connection.map_id)?;
        t.require_node_on_map(connection.to, connection.map_id)?;
        connection.id = ConnectionId(t.allocate());
        let id = connection.id;
        t.connections.push(connection);
        Ok(id)
    }

    /// Everything written to `navigation_logs`, oldest first.
    pub fn navigation_log(&self) -> Vec<NavigationLogEntry> {
        self.tables.read().navigation_logs.clone()
    }

    pub fn walking_sessions(&self) -> Vec<WalkingSessionRecord> {
        self.tables.read().walking_sessions.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let t = self.tables.read();
        StoreSnapshot {
            maps: t.maps.values().map(MapRow::from).collect(),
            map_nodes: t.nodes.values().map(NodeRow::from).collect(),
            place_embeddings: t.places.iter().map(PlaceEmbeddingRow::from).collect(),
            node_connections: t.connections.iter().map(ConnectionRow::from).collect(),
            navigation_paths: t.paths.values().map(PathRow::from).collect(),
            path_waypoints: t
                .waypoints
                .values()
                .flatten()
                .map(WaypointRow::from)
                .collect(),
            walking_sessions: t.walking_sessions.clone(),
            navigation_logs: t.navigation_logs.clone(),
        }
    }

    /// Build a store from snapshot rows, validating every row and every
    /// cross-table reference.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let mut t = Tables::default();
        let mut max_id = 0u64;

        for row in snapshot.maps {
            let map = Map::try_from(row)?;
            max_id = max_id.max(map.id.0);
            t.maps.insert(map.id, map);
        }
        for row in snapshot.map_nodes {
            let node = Node::try_from(row)?;
            if !t.maps.contains_key(&node.map_id) {
                return Err(MargaError::InvalidRecord(format!(
                    "node {} references missing map {}",
                    node.id, node.map_id
                )));
            }
            max_id = max_id.max(node.id.0);
            t.nodes.insert(node.id, node);
        }
        for row in snapshot.place_embeddings {
            let place = PlaceEmbedding::try_from(row)?;
            if !t.nodes.contains_key(&place.node_id) {
                return Err(MargaError::InvalidRecord(format!(
                    "place embedding {} references missing node {}",
                    place.id, place.node_id
                )));
            }
            max_id = max_id.max(place.id.0);
            t.places.push(place);
        }
        for row in snapshot.node_connections {
            let connection = Connection::try_from(row)?;
            t.require_node_on_map(connection.from, connection.map_id)?;
            t.require_node_on_map(connection.to, connection.map_id)?;
            max_id = max_id.max(connection.id.0);
            t.connections.push(connection);
        }
        for row in snapshot.navigation_paths {
            let path = NavigationPath::try_from(row)?;
            t.require_node_on_map(path.start_node, path.map_id)?;
            t.require_node_on_map(path.end_node, path.map_id)?;
            max_id = max_id.max(path.id.0);
            t.paths.insert(path.id, path);
        }
        for row in snapshot.path_waypoints {
            let waypoint = Waypoint::try_from(row)?;
            if !t.paths.contains_key(&waypoint.path_id) {
                return Err(MargaError::InvalidRecord(format!(
                    "waypoint {} references missing path {}",
                    waypoint.id, waypoint.path_id
                )));
            }
            max_id = max_id.max(waypoint.id.0);
            t.waypoints
                .entry(waypoint.path_id)
                .or_default()
                .push(waypoint);
        }
        for (path_id, waypoints) in t.waypoints.iter_mut() {
            waypoints.sort_by_key(|w| w.sequence_number());
            validate_sequence(waypoints.iter().map(|w| w.sequence_number())).map_err(|e| {
                MargaError::InvalidRecord(format!("path {}: {}", path_id, e))
            })?;
        }

        t.walking_sessions = snapshot.walking_sessions;
        t.navigation_logs = snapshot.navigation_logs;
        t.next_id = max_id;

        Ok(Self {
            tables: RwLock::new(t),
        })
    }

    /// Write the store to `path` as JSON.
    ///
    /// The file is written next to the target and renamed into place so a
    /// crash never leaves a truncated snapshot.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        info!("Saved store snapshot to {}", path.display());
        Ok(())
    }

    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
        let store = Self::from_snapshot(snapshot)?;
        info!("Loaded store snapshot from {}", path.display());
        Ok(store)
    }
}

impl PathStore for MemoryStore {
    fn map(&self, id: MapId) -> Result<Map> {
        self.tables
            .read()
            .maps
            .get(&id)
            .cloned()
            .ok_or_else(|| MargaError::NotFound(format!("map {}", id)))
    }

    fn maps(&self) -> Result<Vec<Map>> {
        Ok(self.tables.read().maps.values().cloned().collect())
    }

    fn nodes(&self, map: MapId) -> Result<Vec<Node>> {
        Ok(self
            .tables
            .read()
            .nodes
            .values()
            .filter(|n| n.map_id == map)
            .cloned()
            .collect())
    }

    fn node(&self, id: NodeId) -> Result<Node> {
        self.tables
            .read()
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| MargaError::NotFound(format!("node {}", id)))
    }

    fn place_embeddings(&self, map: MapId) -> Result<Vec<PlaceEmbedding>> {
        let t = self.tables.read();
        Ok(t.places
            .iter()
            .filter(|p| t.nodes.get(&p.node_id).is_some_and(|n| n.map_id == map))
            .cloned()
            .collect())
    }

    fn connections(&self, map: MapId) -> Result<Vec<Connection>> {
        Ok(self
            .tables
            .read()
            .connections
            .iter()
            .filter(|c| c.map_id == map)
            .cloned()
            .collect())
    }

    fn paths_from(&self, node: NodeId) -> Result<Vec<NavigationPath>> {
        Ok(self
            .tables
            .read()
            .paths
            .values()
            .filter(|p| p.start_node == node)
            .cloned()
            .collect())
    }

    fn paths_on_map(&self, map: MapId) -> Result<Vec<NavigationPath>> {
        Ok(self
            .tables
            .read()
            .paths
            .values()
            .filter(|p| p.map_id == map)
            .cloned()
            .collect())
    }

    fn path(&self, id: PathId) -> Result<NavigationPath> {
        self.tables
            .read()
            .paths
            .get(&id)
            .cloned()
            .ok_or_else(|| MargaError::NotFound(format!("path {}", id)))
    }

    fn waypoints(&self, path: PathId) -> Result<Vec<Waypoint>> {
        let t = self.tables.read();
        if !t.paths.contains_key(&path) {
            return Err(MargaError::NotFound(format!("path {}", path)));
        }
        Ok(t.waypoints.get(&path).cloned().unwrap_or_default())
    }

    fn insert_path(&self, draft: PathDraft) -> Result<PathId> {
        draft.validate()?;

        let mut t = self.tables.write();
        if !t.maps.contains_key(&draft.map_id) {
            return Err(MargaError::NotFound(format!("map {}", draft.map_id)));
        }
        t.require_node_on_map(draft.start_node, draft.map_id)?;
        t.require_node_on_map(draft.end_node, draft.map_id)?;

        // Nothing below can fail, so the path and its waypoints land together
        let path_id = PathId(t.allocate());
        let path = NavigationPath {
            id: path_id,
            map_id: draft.map_id,
            name: draft.name,
            start_node: draft.start_node,
            end_node: draft.end_node,
            estimated_distance_m: draft.estimated_distance_m,
            estimated_steps: draft.estimated_steps,
            created_at_ms: now_ms(),
        };
        let waypoints: Vec<Waypoint> = draft
            .waypoints
            .into_iter()
            .map(|data| Waypoint {
                id: WaypointId(t.allocate()),
                path_id,
                data,
            })
            .collect();

        info!(
            "Stored path {} '{}' with {} waypoints",
            path_id,
            path.name,
            waypoints.len()
        );
        t.paths.insert(path_id, path);
        t.waypoints.insert(path_id, waypoints);
        Ok(path_id)
    }

    fn log_navigation(&self, entry: NavigationLogEntry) -> Result<()> {
        debug!("Navigation log: {:?} at waypoint {}", entry.kind, entry.waypoint_index);
        self.tables.write().navigation_logs.push(entry);
        Ok(())
    }

    fn save_walking_session(&self, record: WalkingSessionRecord) -> Result<()> {
        self.tables.write().walking_sessions.push(record);
        Ok(())
    }
}
