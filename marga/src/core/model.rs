//! Persisted records: maps, nodes, connections, paths and waypoints.
//!
//! Records are plain data with public fields. Every constructor and the
//! `validate` methods enforce the invariants the persistence contract
//! declares, so a record that exists in memory is known to be well-formed.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::embedding::Embedding;
use super::heading::{CardinalDirection, TurnDirection};
use crate::error::{MargaError, Result};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_type!(
    /// Row id in `maps`.
    MapId
);
id_type!(
    /// Row id in `map_nodes`.
    NodeId
);
id_type!(
    /// Row id in `node_connections`.
    ConnectionId
);
id_type!(
    /// Row id in `navigation_paths`.
    PathId
);
id_type!(
    /// Row id in `path_waypoints`.
    WaypointId
);
id_type!(
    /// Row id in `place_embeddings`.
    PlaceEmbeddingId
);

fn invalid(msg: impl Into<String>) -> MargaError {
    MargaError::InvalidRecord(msg.into())
}

pub(crate) fn check_heading(field: &str, heading: f32) -> Result<()> {
    if heading.is_finite() && (0.0..360.0).contains(&heading) {
        Ok(())
    } else {
        Err(invalid(format!("{} {} outside [0, 360)", field, heading)))
    }
}

fn check_non_negative(field: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{} {} must be >= 0", field, value)))
    }
}

fn check_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        Err(invalid(format!("{} is empty", field)))
    } else {
        Ok(())
    }
}

/// Named floor plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub id: MapId,
    pub name: String,
    pub created_at_ms: u64,
}

impl Map {
    pub fn new(id: MapId, name: impl Into<String>, created_at_ms: u64) -> Result<Self> {
        let name = name.into();
        check_name("map name", &name)?;
        Ok(Self {
            id,
            name,
            created_at_ms,
        })
    }
}

/// Named point on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub map_id: MapId,
    pub name: String,
    /// Position on the floor plan (map units).
    pub x: f32,
    pub y: f32,
    /// Heading the user should face when standing here.
    pub reference_heading: Option<f32>,
}

impl Node {
    pub fn new(
        id: NodeId,
        map_id: MapId,
        name: impl Into<String>,
        x: f32,
        y: f32,
        reference_heading: Option<f32>,
    ) -> Result<Self> {
        let node = Self {
            id,
            map_id,
            name: name.into(),
            x,
            y,
            reference_heading,
        };
        node.validate()?;
        Ok(node)
    }

    pub fn validate(&self) -> Result<()> {
        check_name("node name", &self.name)?;
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(invalid(format!("node {} has non-finite coordinates", self.id)));
        }
        if let Some(h) = self.reference_heading {
            check_heading("node reference heading", h)?;
        }
        Ok(())
    }
}

/// Summary edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub map_id: MapId,
    pub from: NodeId,
    pub to: NodeId,
    pub distance_m: f32,
    pub steps: u32,
    pub average_heading: f32,
    pub instruction: String,
    /// Detector labels expected along the way.
    pub confirmations: Vec<String>,
    pub bidirectional: bool,
}

impl Connection {
    pub fn validate(&self) -> Result<()> {
        if self.from == self.to {
            return Err(invalid(format!(
                "connection {} joins node {} to itself",
                self.id, self.from
            )));
        }
        check_non_negative("connection distance", self.distance_m)?;
        check_heading("connection heading", self.average_heading)
    }

    /// Whether this edge can be walked from `node`.
    pub fn departs_from(&self, node: NodeId) -> bool {
        self.from == node || (self.bidirectional && self.to == node)
    }
}

/// Recorded route between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationPath {
    pub id: PathId,
    pub map_id: MapId,
    pub name: String,
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub estimated_distance_m: f32,
    pub estimated_steps: u32,
    pub created_at_ms: u64,
}

impl NavigationPath {
    pub fn validate(&self) -> Result<()> {
        check_name("path name", &self.name)?;
        check_non_negative("path distance", self.estimated_distance_m)
    }
}

/// Waypoint payload shared by drafts and persisted waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointDraft {
    pub sequence_number: u32,
    pub embedding: Embedding,
    pub heading: f32,
    /// Signed change from the previous waypoint, `[-180, 180]`.
    pub heading_change: f32,
    pub turn: TurnDirection,
    pub is_decision_point: bool,
    pub landmark: Option<String>,
    pub distance_from_previous_m: Option<f32>,
    pub timestamp_ms: u64,
}

impl WaypointDraft {
    pub fn validate(&self) -> Result<()> {
        check_heading("waypoint heading", self.heading)?;
        if !self.heading_change.is_finite() || !(-180.0..=180.0).contains(&self.heading_change) {
            return Err(invalid(format!(
                "waypoint heading change {} outside [-180, 180]",
                self.heading_change
            )));
        }
        if let Some(d) = self.distance_from_previous_m {
            check_non_negative("waypoint distance", d)?;
        }
        Ok(())
    }
}

/// One recorded point along a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: WaypointId,
    pub path_id: PathId,
    #[serde(flatten)]
    pub data: WaypointDraft,
}

impl Waypoint {
    pub fn sequence_number(&self) -> u32 {
        self.data.sequence_number
    }

    pub fn embedding(&self) -> &Embedding {
        &self.data.embedding
    }

    pub fn heading(&self) -> f32 {
        self.data.heading
    }
}

/// Reference embedding taught for a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceEmbedding {
    pub id: PlaceEmbeddingId,
    pub node_id: NodeId,
    pub direction: Option<CardinalDirection>,
    pub embedding: Embedding,
}

/// A complete path ready to be persisted atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct PathDraft {
    pub map_id: MapId,
    pub name: String,
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub estimated_distance_m: f32,
    pub estimated_steps: u32,
    pub waypoints: Vec<WaypointDraft>,
}

impl PathDraft {
    pub fn validate(&self) -> Result<()> {
        check_name("path name", &self.name)?;
        check_non_negative("path distance", self.estimated_distance_m)?;
        if self.waypoints.is_empty() {
            return Err(invalid(format!("path '{}' has no waypoints", self.name)));
        }
        for waypoint in &self.waypoints {
            waypoint.validate()?;
        }
        validate_sequence(self.waypoints.iter().map(|w| w.sequence_number))
    }
}

/// Check that sequence numbers are exactly `0..n-1` in order.
pub fn validate_sequence(sequence: impl IntoIterator<Item = u32>) -> Result<()> {
    for (expected, actual) in sequence.into_iter().enumerate() {
        if actual as usize != expected {
            return Err(invalid(format!(
                "waypoint sequence broken: expected {}, found {}",
                expected, actual
            )));
        }
    }
    Ok(())
}
