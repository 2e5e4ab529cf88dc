//! Position localization.
//!
//! [`WaypointIndex`] holds the embeddings that identify the nodes of one map;
//! [`PositionLocalizer`] runs the directional and scanning protocols against
//! it. [`best_waypoint`] is the route-local variant used by navigation, which
//! only searches the waypoints still ahead of the user.

mod aggregate;
mod index;
mod localizer;
mod matching;

pub use aggregate::ScoreAggregation;
pub use index::{IndexEntry, IndexHit, WaypointIndex};
pub use localizer::{LocationMatch, PositionLocalizer};
pub use matching::{WaypointHit, best_waypoint};
