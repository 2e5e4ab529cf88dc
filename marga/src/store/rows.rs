//! Row shapes of the persistence contract.
//!
//! Rows mirror the relational tables one-to-one, with loose column types
//! (`i64`, `f64`, `String`). Conversion into model records happens here, and
//! only here: a row that violates a table constraint fails fast with
//! `MargaError::InvalidRecord` instead of travelling further.

use serde::{Deserialize, Serialize};

use crate::core::{
    CardinalDirection, Connection, ConnectionId, Embedding, Map, MapId, NavigationPath, Node,
    NodeId, PathId, PlaceEmbedding, PlaceEmbeddingId, TurnDirection, Waypoint, WaypointDraft,
    WaypointId,
};
use crate::error::{MargaError, Result};

fn non_negative_id(table: &str, column: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| {
        MargaError::InvalidRecord(format!("{}.{} is negative: {}", table, column, value))
    })
}

fn finite_f32(table: &str, column: &str, value: f64) -> Result<f32> {
    if value.is_finite() {
        Ok(value as f32)
    } else {
        Err(MargaError::InvalidRecord(format!(
            "{}.{} is not a finite number",
            table, column
        )))
    }
}

/// `maps` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

impl TryFrom<MapRow> for Map {
    type Error = MargaError;

    fn try_from(row: MapRow) -> Result<Self> {
        Map::new(
            MapId(non_negative_id("maps", "id", row.id)?),
            row.name,
            non_negative_id("maps", "created_at", row.created_at)?,
        )
    }
}

impl From<&Map> for MapRow {
    fn from(map: &Map) -> Self {
        Self {
            id: map.id.0 as i64,
            name: map.name.clone(),
            created_at: map.created_at_ms as i64,
        }
    }
}

/// `map_nodes` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: i64,
    pub map_id: i64,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub reference_direction: Option<f64>,
}

impl TryFrom<NodeRow> for Node {
    type Error = MargaError;

    fn try_from(row: NodeRow) -> Result<Self> {
        let heading = row
            .reference_direction
            .map(|h| finite_f32("map_nodes", "reference_direction", h))
            .transpose()?;
        Node::new(
            NodeId(non_negative_id("map_nodes", "id", row.id)?),
            MapId(non_negative_id("map_nodes", "map_id", row.map_id)?),
            row.name,
            finite_f32("map_nodes", "x", row.x)?,
            finite_f32("map_nodes", "y", row.y)?,
            heading,
        )
    }
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.0 as i64,
            map_id: node.map_id.0 as i64,
            name: node.name.clone(),
            x: node.x as f64,
            y: node.y as f64,
            reference_direction: node.reference_heading.map(f64::from),
        }
    }
}

/// `node_connections` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRow {
    pub id: i64,
    pub map_id: i64,
    pub from_node_id: i64,
    pub to_node_id: i64,
    pub distance_meters: f64,
    pub steps: i64,
    pub average_heading: f64,
    pub instruction: String,
    #[serde(default)]
    pub confirmation_objects: Vec<String>,
    pub is_bidirectional: bool,
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = MargaError;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        let steps = u32::try_from(row.steps).map_err(|_| {
            MargaError::InvalidRecord(format!("node_connections.steps out of range: {}", row.steps))
        })?;
        let connection = Connection {
            id: ConnectionId(non_negative_id("node_connections", "id", row.id)?),
            map_id: MapId(non_negative_id("node_connections", "map_id", row.map_id)?),
            from: NodeId(non_negative_id("node_connections", "from_node_id", row.from_node_id)?),
            to: NodeId(non_negative_id("node_connections", "to_node_id", row.to_node_id)?),
            distance_m: finite_f32("node_connections", "distance_meters", row.distance_meters)?,
            steps,
            average_heading: finite_f32("node_connections", "average_heading", row.average_heading)?,
            instruction: row.instruction,
            confirmations: row.confirmation_objects,
            bidirectional: row.is_bidirectional,
        };
        connection.validate()?;
        Ok(connection)
    }
}

impl From<&Connection> for ConnectionRow {
    fn from(c: &Connection) -> Self {
        Self {
            id: c.id.0 as i64,
            map_id: c.map_id.0 as i64,
            from_node_id: c.from.0 as i64,
            to_node_id: c.to.0 as i64,
            distance_meters: c.distance_m as f64,
            steps: c.steps as i64,
            average_heading: c.average_heading as f64,
            instruction: c.instruction.clone(),
            confirmation_objects: c.confirmations.clone(),
            is_bidirectional: c.bidirectional,
        }
    }
}

/// `navigation_paths` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRow {
    pub id: i64,
    pub map_id: i64,
    pub name: String,
    pub start_node_id: i64,
    pub end_node_id: i64,
    #[serde(default)]
    pub estimated_distance: f64,
    #[serde(default)]
    pub estimated_steps: i64,
    pub created_at: i64,
}

impl TryFrom<PathRow> for NavigationPath {
    type Error = MargaError;

    fn try_from(row: PathRow) -> Result<Self> {
        let estimated_steps = u32::try_from(row.estimated_steps).map_err(|_| {
            MargaError::InvalidRecord(format!(
                "navigation_paths.estimated_steps out of range: {}",
                row.estimated_steps
            ))
        })?;
        let path = NavigationPath {
            id: PathId(non_negative_id("navigation_paths", "id", row.id)?),
            map_id: MapId(non_negative_id("navigation_paths", "map_id", row.map_id)?),
            name: row.name,
            start_node: NodeId(non_negative_id(
                "navigation_paths",
                "start_node_id",
                row.start_node_id,
            )?),
            end_node: NodeId(non_negative_id("navigation_paths", "end_node_id", row.end_node_id)?),
            estimated_distance_m: finite_f32(
                "navigation_paths",
                "estimated_distance",
                row.estimated_distance,
            )?,
            estimated_steps,
            created_at_ms: non_negative_id("navigation_paths", "created_at", row.created_at)?,
        };
        path.validate()?;
        Ok(path)
    }
}

impl From<&NavigationPath> for PathRow {
    fn from(p: &NavigationPath) -> Self {
        Self {
            id: p.id.0 as i64,
            map_id: p.map_id.0 as i64,
            name: p.name.clone(),
            start_node_id: p.start_node.0 as i64,
            end_node_id: p.end_node.0 as i64,
            estimated_distance: p.estimated_distance_m as f64,
            estimated_steps: p.estimated_steps as i64,
            created_at: p.created_at_ms as i64,
        }
    }
}

/// `path_waypoints` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointRow {
    pub id: i64,
    pub path_id: i64,
    pub sequence_number: i64,
    pub embedding: Vec<f32>,
    pub heading: f64,
    pub heading_change: f64,
    pub turn_type: String,
    pub is_decision_point: bool,
    pub landmark_description: Option<String>,
    pub distance_from_previous: Option<f64>,
    pub timestamp: i64,
}

impl TryFrom<WaypointRow> for Waypoint {
    type Error = MargaError;

    fn try_from(row: WaypointRow) -> Result<Self> {
        let sequence_number = u32::try_from(row.sequence_number).map_err(|_| {
            MargaError::InvalidRecord(format!(
                "path_waypoints.sequence_number out of range: {}",
                row.sequence_number
            ))
        })?;
        let turn = TurnDirection::parse(&row.turn_type).ok_or_else(|| {
            MargaError::InvalidRecord(format!(
                "path_waypoints.turn_type unknown: {}",
                row.turn_type
            ))
        })?;
        let data = WaypointDraft {
            sequence_number,
            embedding: Embedding::new(row.embedding)?,
            heading: finite_f32("path_waypoints", "heading", row.heading)?,
            heading_change: finite_f32("path_waypoints", "heading_change", row.heading_change)?,
            turn,
            is_decision_point: row.is_decision_point,
            landmark: row.landmark_description.filter(|l| !l.trim().is_empty()),
            distance_from_previous_m: row
                .distance_from_previous
                .map(|d| finite_f32("path_waypoints", "distance_from_previous", d))
                .transpose()?,
            timestamp_ms: non_negative_id("path_waypoints", "timestamp", row.timestamp)?,
        };
        data.validate()?;
        Ok(Waypoint {
            id: WaypointId(non_negative_id("path_waypoints", "id", row.id)?),
            path_id: PathId(non_negative_id("path_waypoints", "path_id", row.path_id)?),
            data,
        })
    }
}

impl From<&Waypoint> for WaypointRow {
    fn from(w: &Waypoint) -> Self {
        Self {
            id: w.id.0 as i64,
            path_id: w.path_id.0 as i64,
            sequence_number: w.data.sequence_number as i64,
            embedding: w.data.embedding.as_slice().to_vec(),
            heading: w.data.heading as f64,
            heading_change: w.data.heading_change as f64,
            turn_type: w.data.turn.as_str().to_string(),
            is_decision_point: w.data.is_decision_point,
            landmark_description: w.data.landmark.clone(),
            distance_from_previous: w.data.distance_from_previous_m.map(f64::from),
            timestamp: w.data.timestamp_ms as i64,
        }
    }
}

/// `place_embeddings` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceEmbeddingRow {
    pub id: i64,
    pub node_id: i64,
    pub direction: Option<String>,
    pub embedding: Vec<f32>,
}

impl TryFrom<PlaceEmbeddingRow> for PlaceEmbedding {
    type Error = MargaError;

    fn try_from(row: PlaceEmbeddingRow) -> Result<Self> {
        let direction = match row.direction.as_deref() {
            None => None,
            Some(d) => Some(
                CardinalDirection::ALL
                    .into_iter()
                    .find(|c| c.as_str() == d)
                    .ok_or_else(|| {
                        MargaError::InvalidRecord(format!(
                            "place_embeddings.direction unknown: {}",
                            d
                        ))
                    })?,
            ),
        };
        Ok(PlaceEmbedding {
            id: PlaceEmbeddingId(non_negative_id("place_embeddings", "id", row.id)?),
            node_id: NodeId(non_negative_id("place_embeddings", "node_id", row.node_id)?),
            direction,
            embedding: Embedding::new(row.embedding)?,
        })
    }
}

impl From<&PlaceEmbedding> for PlaceEmbeddingRow {
    fn from(p: &PlaceEmbedding) -> Self {
        Self {
            id: p.id.0 as i64,
            node_id: p.node_id.0 as i64,
            direction: p.direction.map(|d| d.as_str().to_string()),
            embedding: p.embedding.as_slice().to_vec(),
        }
    }
}
