//! Navigation phases and the lock-free status shared with other threads.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Navigation execution phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavPhase {
    /// No active route.
    #[default]
    Idle,

    /// Waiting for the user to face the first waypoint.
    InitialOrientation,

    /// Walking; periodic frames advance progress.
    Navigating,

    /// Off route; waiting for the user to start manual captures.
    AwaitingManualCapture,

    /// Collecting manual recovery frames.
    ManualCaptureInProgress,

    /// Matching the collected frames against the rest of the route.
    AnalyzingCapturedFrames,

    /// Final waypoint reached.
    DestinationReached,
}

impl NavPhase {
    const ALL: [NavPhase; 7] = [
        NavPhase::Idle,
        NavPhase::InitialOrientation,
        NavPhase::Navigating,
        NavPhase::AwaitingManualCapture,
        NavPhase::ManualCaptureInProgress,
        NavPhase::AnalyzingCapturedFrames,
        NavPhase::DestinationReached,
    ];

    /// Whether a route is being followed (not idle or arrived).
    pub fn is_active(&self) -> bool {
        !matches!(self, NavPhase::Idle | NavPhase::DestinationReached)
    }

    /// Whether the machine is in the manual recovery sub-protocol.
    pub fn is_recovering(&self) -> bool {
        matches!(
            self,
            NavPhase::AwaitingManualCapture
                | NavPhase::ManualCaptureInProgress
                | NavPhase::AnalyzingCapturedFrames
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NavPhase::Idle => "idle",
            NavPhase::InitialOrientation => "initialOrientation",
            NavPhase::Navigating => "navigating",
            NavPhase::AwaitingManualCapture => "awaitingManualCapture",
            NavPhase::ManualCaptureInProgress => "manualCaptureInProgress",
            NavPhase::AnalyzingCapturedFrames => "analyzingCapturedFrames",
            NavPhase::DestinationReached => "destinationReached",
        }
    }

    fn to_u8(self) -> u8 {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0) as u8
    }

    fn from_u8(v: u8) -> Self {
        Self::ALL.get(v as usize).copied().unwrap_or_default()
    }
}

/// Instruction shown and spoken to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationInstruction {
    pub text: String,
    /// 1-based index of the waypoint the instruction leads to.
    pub waypoint_index: usize,
    pub total_waypoints: usize,
}

/// Status published by the state machine for other threads.
///
/// The capture ticker reads it to decide whether to sample and which epoch
/// to stamp on the frame; UIs read phase and progress.
#[derive(Debug, Default)]
pub struct SharedNavStatus {
    phase: AtomicU8,
    epoch: AtomicU64,
    /// Progress percentage as f32 bits.
    progress: AtomicU32,
    shutdown: AtomicBool,
}

impl SharedNavStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> NavPhase {
        NavPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: NavPhase) {
        self.phase.store(phase.to_u8(), Ordering::Release);
    }

    /// Current capture epoch. Frames stamped with an older epoch are stale.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Invalidate every capture requested so far; returns the new epoch.
    pub(crate) fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Relaxed))
    }

    pub(crate) fn set_progress(&self, percent: f32) {
        self.progress.store(percent.to_bits(), Ordering::Relaxed);
    }

    /// Whether periodic navigation samples are wanted right now.
    pub fn wants_samples(&self) -> bool {
        self.phase() == NavPhase::Navigating
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
