//! Core records and math shared by every layer.

pub mod embedding;
pub mod heading;
pub mod model;
pub mod types;

pub use embedding::{EMBEDDING_DIM, Embedding};
pub use heading::{
    CardinalDirection, TurnDirection, heading_difference, normalize_heading, signed_heading_change,
};
pub use model::{
    Connection, ConnectionId, Map, MapId, NavigationPath, Node, NodeId, PathDraft, PathId,
    PlaceEmbedding, PlaceEmbeddingId, Waypoint, WaypointDraft, WaypointId, validate_sequence,
};
pub use types::{BoundingBox, Detection, Frame};
