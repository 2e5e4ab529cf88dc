//! Persistence contract.
//!
//! The relational store with vector search lives outside this crate. The
//! engine talks to it through [`PathStore`]; [`MemoryStore`] is the in-process
//! implementation used by tests, the inspection binary and hosts without a
//! database.
//!
//! Reads return validated model records. Writes of a path are all-or-nothing:
//! a path and its waypoints become visible together or not at all.

mod memory;
pub mod rows;

pub use memory::{MemoryStore, StoreSnapshot};

use serde::{Deserialize, Serialize};

use crate::core::{
    Connection, Map, MapId, NavigationPath, Node, NodeId, PathDraft, PathId, PlaceEmbedding,
    Waypoint,
};
use crate::error::Result;

/// Navigation event kinds written to `navigation_logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationLogKind {
    Started,
    Advanced,
    DeviationDetected,
    Relocalized,
    LocalizationLost,
    Arrived,
    Stopped,
}

/// One `navigation_logs` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationLogEntry {
    pub path_id: PathId,
    pub kind: NavigationLogKind,
    /// Waypoint index at the time of the event.
    pub waypoint_index: usize,
    pub timestamp_ms: u64,
}

/// How a recording session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkingSessionOutcome {
    Finalized,
    Cancelled,
}

/// One `walking_sessions` row: summary of a teach-by-walking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkingSessionRecord {
    pub map_id: MapId,
    pub start_node: NodeId,
    pub end_node: NodeId,
    /// Set when the session was finalized into a path.
    pub path_id: Option<PathId>,
    pub steps: u64,
    pub distance_m: f32,
    pub segments: usize,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub outcome: WalkingSessionOutcome,
}

/// Read/write access to taught maps and paths.
pub trait PathStore: Send + Sync {
    fn map(&self, id: MapId) -> Result<Map>;

    fn maps(&self) -> Result<Vec<Map>>;

    fn nodes(&self, map: MapId) -> Result<Vec<Node>>;

    fn node(&self, id: NodeId) -> Result<Node>;

    /// Reference embeddings taught for the nodes of `map`.
    fn place_embeddings(&self, map: MapId) -> Result<Vec<PlaceEmbedding>>;

    fn connections(&self, map: MapId) -> Result<Vec<Connection>>;

    /// Paths whose start node is `node`.
    fn paths_from(&self, node: NodeId) -> Result<Vec<NavigationPath>>;

    fn paths_on_map(&self, map: MapId) -> Result<Vec<NavigationPath>>;

    fn path(&self, id: PathId) -> Result<NavigationPath>;

    /// Waypoints of `path` ordered by sequence number.
    fn waypoints(&self, path: PathId) -> Result<Vec<Waypoint>>;

    /// Persist a path and all of its waypoints atomically.
    fn insert_path(&self, draft: PathDraft) -> Result<PathId>;

    fn log_navigation(&self, entry: NavigationLogEntry) -> Result<()>;

    fn save_walking_session(&self, record: WalkingSessionRecord) -> Result<()>;
}
