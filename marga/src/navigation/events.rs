//! Events emitted by the navigation state machine.

use crossbeam_channel::Sender;
use serde::Serialize;

use super::state::{NavPhase, NavigationInstruction};
use crate::core::TurnDirection;

/// Everything the UI or voice layer needs to render navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NavEvent {
    PhaseChanged {
        from: NavPhase,
        to: NavPhase,
    },

    Instruction(NavigationInstruction),

    Progress {
        /// 0-based index of the last waypoint reached.
        index: usize,
        total: usize,
        percentage: f32,
    },

    /// Heading feedback while orienting before the walk.
    OrientationHint {
        /// Unsigned error in degrees, `[0, 180]`.
        difference: f32,
        /// Which way to turn to reduce the error.
        turn: TurnDirection,
        aligned: bool,
    },

    DeviationDetected {
        low_frames: usize,
        similarity: f32,
    },

    ManualFrameCaptured {
        captured: usize,
        required: usize,
    },

    RecoveryAttemptFailed {
        attempt: u32,
        max_attempts: u32,
        best_similarity: f32,
    },

    Relocalized {
        index: usize,
        similarity: f32,
    },

    /// Recovery exhausted; navigation returns to idle.
    LocalizationLost {
        attempts: u32,
        message: String,
    },

    DestinationReached {
        destination: String,
    },

    /// Non-fatal problem the user should know about (camera, embedding).
    Status {
        message: String,
    },
}

/// Receiver of navigation events.
///
/// Implemented for closures and crossbeam senders. Emitting must not block.
pub trait EventSink: Send {
    fn emit(&mut self, event: NavEvent);
}

impl<F> EventSink for F
where
    F: FnMut(NavEvent) + Send,
{
    fn emit(&mut self, event: NavEvent) {
        self(event)
    }
}

impl EventSink for Sender<NavEvent> {
    fn emit(&mut self, event: NavEvent) {
        // A dropped receiver means nobody is listening anymore
        let _ = self.try_send(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: NavEvent) {}
}
