//! # Marga
//!
//! Teach-and-navigate indoor localization engine.
//!
//! ## Overview
//!
//! A sighted operator teaches a route by walking it once; a user later
//! follows it with visual guidance.
//!
//! - **Recording** - step-counted walk split into segments at landmark
//!   checkpoints, finalized into an ordered list of waypoints
//! - **Localization** - "where am I?" from four directional frames or a short
//!   camera scan, matched against taught place embeddings
//! - **Navigation** - progress along a route from periodic frames, with
//!   deviation detection and bounded manual recovery
//! - **Camera access** - one outstanding capture system-wide, never queued
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marga::{MargaConfig, NavigationStateMachine, RouteMatcher};
//!
//! let config = MargaConfig::default();
//! let routes = RouteMatcher::new(store.clone(), config.navigation.walking_speed_mps);
//! let route = routes.available_routes(lobby)?.remove(0);
//!
//! let (tx, events) = crossbeam_channel::unbounded();
//! let mut nav = NavigationStateMachine::new(config.navigation.clone(), embedder, Box::new(tx));
//! nav.start(route)?;
//! nav.on_heading(compass_degrees);
//! ```
//!
//! ## Conventions
//!
//! - Headings: degrees clockwise from north, `[0, 360)`
//! - Distances: metres, from step count times stride length
//! - Similarity: cosine similarity clamped to `[0, 1]`

// Core records and math
pub mod core;

// Configuration and errors
pub mod config;
pub mod error;

// Collaborator seams
pub mod sensors;
pub mod vision;

// Exclusive camera access
pub mod camera;

// Persistence contract and in-memory store
pub mod store;

// Teach-by-walking
pub mod recording;

// Where am I?
pub mod localization;

// Route lookup and guidance
pub mod navigation;
pub mod routes;
pub mod threads;

pub mod utils;

// Re-export commonly used types
pub use camera::{CameraAccessCoordinator, CapturePurpose, FrameSource, PeriodicCapture};
pub use config::MargaConfig;
pub use core::{
    CardinalDirection, Detection, Embedding, Frame, NavigationPath, NodeId, PathId,
    TurnDirection, Waypoint,
};
pub use error::{MargaError, Result};
pub use localization::{LocationMatch, PositionLocalizer, WaypointIndex};
pub use navigation::{EventSink, NavEvent, NavPhase, NavigationStateMachine};
pub use recording::{PathRecordingSession, RecordingState, RecordingTarget};
pub use routes::{NavigationRoute, RouteMatcher};
pub use store::{MemoryStore, PathStore};
pub use threads::NavigationSession;
pub use vision::{Embedder, ObjectDetector, VerificationJudge};
