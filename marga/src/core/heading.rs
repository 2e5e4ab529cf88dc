//! Compass heading arithmetic.
//!
//! Headings are degrees clockwise from north in `[0, 360)`. Heading changes
//! are signed degrees in `(-180, 180]`, positive for a clockwise (right) turn.

use serde::{Deserialize, Serialize};

/// Normalize a heading to `[0, 360)`.
#[inline]
pub fn normalize_heading(degrees: f32) -> f32 {
    let h = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if h >= 360.0 { 0.0 } else { h }
}

/// Circular angular difference `min(|a-b|, 360-|a-b|)`, in `[0, 180]`.
#[inline]
pub fn heading_difference(a: f32, b: f32) -> f32 {
    let d = (normalize_heading(a) - normalize_heading(b)).abs();
    d.min(360.0 - d)
}

/// Signed change needed to turn from `from` to `to`, in `(-180, 180]`.
#[inline]
pub fn signed_heading_change(from: f32, to: f32) -> f32 {
    let d = normalize_heading(to - from);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Turn classification attached to a waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnDirection {
    #[default]
    Straight,
    Left,
    Right,
    UTurn,
}

impl TurnDirection {
    /// Classify a signed heading change.
    ///
    /// `|change| <= straight_deg` is straight, `|change| >= u_turn_deg` is a
    /// u-turn, otherwise the sign decides left or right.
    pub fn classify(change: f32, straight_deg: f32, u_turn_deg: f32) -> Self {
        let magnitude = change.abs();
        if magnitude <= straight_deg {
            TurnDirection::Straight
        } else if magnitude >= u_turn_deg {
            TurnDirection::UTurn
        } else if change > 0.0 {
            TurnDirection::Right
        } else {
            TurnDirection::Left
        }
    }

    /// Wire name used by the persistence contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnDirection::Straight => "straight",
            TurnDirection::Left => "left",
            TurnDirection::Right => "right",
            TurnDirection::UTurn => "uTurn",
        }
    }

    /// Parse the wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "straight" => Some(TurnDirection::Straight),
            "left" => Some(TurnDirection::Left),
            "right" => Some(TurnDirection::Right),
            "uTurn" => Some(TurnDirection::UTurn),
            _ => None,
        }
    }

    pub fn is_turn(&self) -> bool {
        !matches!(self, TurnDirection::Straight)
    }
}

/// Capture direction for the multi-directional localization protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardinalDirection {
    North,
    East,
    South,
    West,
}

impl CardinalDirection {
    /// Fixed capture order: N, E, S, W.
    pub const ALL: [CardinalDirection; 4] = [
        CardinalDirection::North,
        CardinalDirection::East,
        CardinalDirection::South,
        CardinalDirection::West,
    ];

    pub fn heading(&self) -> f32 {
        match self {
            CardinalDirection::North => 0.0,
            CardinalDirection::East => 90.0,
            CardinalDirection::South => 180.0,
            CardinalDirection::West => 270.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardinalDirection::North => "north",
            CardinalDirection::East => "east",
            CardinalDirection::South => "south",
            CardinalDirection::West => "west",
        }
    }
}
