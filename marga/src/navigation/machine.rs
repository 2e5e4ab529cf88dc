//! Guided navigation along a taught route.
//!
//! ```text
//! Idle ──start──► InitialOrientation ──aligned──► Navigating ──last waypoint──► DestinationReached
//!                                                   ▲     │
//!                                        relocalized│     │N low frames
//!                                                   │     ▼
//!            AnalyzingCapturedFrames ◄──3 frames── ManualCaptureInProgress ◄── AwaitingManualCapture
//!                       │                                                              ▲
//!                       └───────────────────── no match (retry) ───────────────────────┘
//! ```
//!
//! The machine is synchronous and owns all route state. Frames reach it from
//! the capture ticker or from manual captures, each stamped with the capture
//! epoch it was requested under; frames from an older epoch are dropped.
//! Everything observable goes out through the [`EventSink`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::deviation::DeviationDetector;
use super::events::{EventSink, NavEvent};
use super::instruction::instruction_for;
use super::recovery::{MANUAL_CAPTURE_FRAMES, RecoveryOutcome, RecoveryTracker};
use super::state::{NavPhase, SharedNavStatus};
use crate::config::NavigationConfig;
use crate::core::{Embedding, Frame, TurnDirection, heading_difference, signed_heading_change};
use crate::error::{MargaError, Result};
use crate::localization::best_waypoint;
use crate::routes::NavigationRoute;
use crate::store::{NavigationLogEntry, NavigationLogKind, PathStore};
use crate::utils::now_ms;
use crate::vision::Embedder;

/// Route-following state machine.
pub struct NavigationStateMachine {
    config: NavigationConfig,
    embedder: Arc<dyn Embedder>,
    sink: Box<dyn EventSink>,
    store: Option<Arc<dyn PathStore>>,
    status: Arc<SharedNavStatus>,

    phase: NavPhase,
    route: Option<NavigationRoute>,
    current_index: usize,
    target_heading: f32,
    deviation: DeviationDetector,
    recovery: RecoveryTracker,
}

impl NavigationStateMachine {
    pub fn new(
        config: NavigationConfig,
        embedder: Arc<dyn Embedder>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let deviation =
            DeviationDetector::new(config.deviation_threshold, config.consecutive_low_frames);
        let recovery = RecoveryTracker::new(config.max_recovery_attempts);
        Self {
            config,
            embedder,
            sink,
            store: None,
            status: Arc::new(SharedNavStatus::new()),
            phase: NavPhase::Idle,
            route: None,
            current_index: 0,
            target_heading: 0.0,
            deviation,
            recovery,
        }
    }

    /// Write lifecycle events to the store's navigation log.
    pub fn with_store(mut self, store: Arc<dyn PathStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Status shared with the capture ticker and UI threads.
    pub fn status_handle(&self) -> Arc<SharedNavStatus> {
        Arc::clone(&self.status)
    }

    pub fn phase(&self) -> NavPhase {
        self.phase
    }

    pub fn route(&self) -> Option<&NavigationRoute> {
        self.route.as_ref()
    }

    /// Index of the last waypoint reached.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn target_heading(&self) -> f32 {
        self.target_heading
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.recovery.attempts()
    }

    /// `100 * current_index / (total - 1)`; single-waypoint routes are 100 %.
    pub fn progress_percentage(&self) -> f32 {
        match &self.route {
            None => 0.0,
            Some(route) if route.len() <= 1 => 100.0,
            Some(route) => 100.0 * self.current_index as f32 / (route.len() - 1) as f32,
        }
    }

    /// Begin guidance along `route`, replacing any route in progress.
    pub fn start(&mut self, route: NavigationRoute) -> Result<()> {
        if let Err(e) = route.validate() {
            warn!("Rejected route '{}': {}", route.path.name, e);
            self.sink.emit(NavEvent::Status {
                message: e.user_message(),
            });
            return Err(e);
        }
        if self.route.is_some() {
            self.stop();
        }

        info!(
            "Starting navigation on '{}' ({} waypoints, {})",
            route.path.name,
            route.len(),
            route.distance_text
        );
        self.target_heading = route.first_heading().unwrap_or_default();
        self.current_index = 0;
        self.deviation.reset();
        self.recovery.reset();
        let instruction = instruction_for(&route, 0);
        self.route = Some(route);

        self.status.bump_epoch();
        self.publish_progress();
        self.transition(NavPhase::InitialOrientation);
        self.sink.emit(NavEvent::Instruction(instruction));
        self.log(NavigationLogKind::Started);
        Ok(())
    }

    /// Compass reading in degrees. Only used while orienting.
    pub fn on_heading(&mut self, heading: f32) {
        if self.phase != NavPhase::InitialOrientation {
            return;
        }
        let difference = heading_difference(heading, self.target_heading);
        let turn = if signed_heading_change(heading, self.target_heading) >= 0.0 {
            TurnDirection::Right
        } else {
            TurnDirection::Left
        };
        let aligned = difference <= self.config.orientation_tolerance_deg;
        self.sink.emit(NavEvent::OrientationHint {
            difference,
            turn,
            aligned,
        });
        if aligned {
            debug!("Aligned with first waypoint ({:.1}° off)", difference);
            self.transition(NavPhase::Navigating);
        }
    }

    /// Periodic navigation frame captured under `epoch`.
    pub fn on_frame(&mut self, epoch: u64, frame: &Frame) {
        if !self.is_current(epoch) {
            debug!("Dropping stale navigation frame {} (epoch {})", frame.sequence, epoch);
            return;
        }
        if self.phase != NavPhase::Navigating {
            debug!("Ignoring navigation frame in {}", self.phase.as_str());
            return;
        }
        match self.embedder.embed(frame) {
            Ok(embedding) => self.on_embedding(&embedding),
            Err(e) => {
                warn!("Navigation frame {} not embedded: {}", frame.sequence, e);
                self.sink.emit(NavEvent::Status {
                    message: e.user_message(),
                });
            }
        }
    }

    fn on_embedding(&mut self, embedding: &Embedding) {
        let Some(route) = &self.route else {
            return;
        };
        let last = route.len() - 1;
        if self.current_index >= last {
            self.arrive();
            return;
        }

        let hit = best_waypoint(std::slice::from_ref(embedding), &route.waypoints, self.current_index);
        if let Some(hit) = hit
            && hit.similarity >= self.config.match_threshold
            && hit.index > self.current_index
        {
            debug!(
                "Matched waypoint {} (similarity {:.3})",
                hit.sequence, hit.similarity
            );
            self.deviation.reset();
            self.advance_to(hit.index);
            return;
        }

        let next = route.waypoints[self.current_index + 1].embedding();
        let similarity = embedding.similarity(next);
        if self.deviation.observe(similarity) {
            self.enter_recovery(similarity);
        }
    }

    /// User asked to start capturing recovery frames.
    pub fn begin_manual_capture(&mut self) -> Result<()> {
        match self.phase {
            NavPhase::ManualCaptureInProgress => Ok(()),
            NavPhase::AwaitingManualCapture => {
                self.transition(NavPhase::ManualCaptureInProgress);
                Ok(())
            }
            other => Err(MargaError::invalid_state("begin_manual_capture", other.as_str())),
        }
    }

    /// Manual recovery frame captured under `epoch`.
    ///
    /// The third frame triggers analysis. Returns `LocalizationLost` when the
    /// final permitted analysis fails; the machine is then idle.
    pub fn on_manual_frame(&mut self, epoch: u64, frame: &Frame) -> Result<()> {
        if !self.is_current(epoch) {
            debug!("Dropping stale manual frame {} (epoch {})", frame.sequence, epoch);
            return Ok(());
        }
        if self.phase == NavPhase::AwaitingManualCapture {
            self.begin_manual_capture()?;
        }
        if self.phase != NavPhase::ManualCaptureInProgress {
            return Err(MargaError::invalid_state("manual_frame", self.phase.as_str()));
        }

        let embedding = match self.embedder.embed(frame) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Manual frame {} not embedded: {}", frame.sequence, e);
                self.sink.emit(NavEvent::Status {
                    message: e.user_message(),
                });
                return Err(e);
            }
        };

        let captured = self.recovery.add_frame(embedding);
        self.sink.emit(NavEvent::ManualFrameCaptured {
            captured,
            required: MANUAL_CAPTURE_FRAMES,
        });
        if self.recovery.is_ready() {
            self.analyze()
        } else {
            Ok(())
        }
    }

    fn analyze(&mut self) -> Result<()> {
        self.transition(NavPhase::AnalyzingCapturedFrames);
        let frames = self.recovery.take_frames();
        let Some(route) = &self.route else {
            return Err(MargaError::invalid_state("analyze", "idle"));
        };
        let hit = best_waypoint(&frames, &route.waypoints, self.current_index);
        let best_similarity = hit.map(|h| h.similarity).unwrap_or_default();

        if let Some(hit) = hit
            && hit.similarity >= self.config.recovery_match_threshold
        {
            let index = hit.index.max(self.current_index);
            info!(
                "Relocalized at waypoint {} (similarity {:.3})",
                index, hit.similarity
            );
            self.recovery.reset();
            self.deviation.reset();
            self.sink.emit(NavEvent::Relocalized {
                index,
                similarity: hit.similarity,
            });
            self.log(NavigationLogKind::Relocalized);
            self.transition(NavPhase::Navigating);
            if index > self.current_index {
                self.advance_to(index);
            }
            return Ok(());
        }

        match self.recovery.record_failure() {
            RecoveryOutcome::Retry { attempt } => {
                info!(
                    "Recovery attempt {}/{} failed (best {:.3})",
                    attempt,
                    self.recovery.max_attempts(),
                    best_similarity
                );
                self.sink.emit(NavEvent::RecoveryAttemptFailed {
                    attempt,
                    max_attempts: self.recovery.max_attempts(),
                    best_similarity,
                });
                self.transition(NavPhase::AwaitingManualCapture);
                Ok(())
            }
            RecoveryOutcome::Exhausted { attempts } => {
                warn!("Localization lost after {} recovery attempts", attempts);
                let error = MargaError::LocalizationLost { attempts };
                self.sink.emit(NavEvent::RecoveryAttemptFailed {
                    attempt: attempts,
                    max_attempts: self.recovery.max_attempts(),
                    best_similarity,
                });
                self.sink.emit(NavEvent::LocalizationLost {
                    attempts,
                    message: error.user_message(),
                });
                self.log(NavigationLogKind::LocalizationLost);
                self.reset_to_idle();
                Err(error)
            }
        }
    }

    /// Abandon the route. Valid from any phase; repeated calls are no-ops.
    pub fn stop(&mut self) {
        if self.route.is_none() && self.phase == NavPhase::Idle {
            return;
        }
        info!("Navigation stopped in {}", self.phase.as_str());
        self.log(NavigationLogKind::Stopped);
        self.reset_to_idle();
    }

    fn reset_to_idle(&mut self) {
        self.status.bump_epoch();
        self.route = None;
        self.current_index = 0;
        self.deviation.reset();
        self.recovery.reset();
        self.publish_progress();
        self.transition(NavPhase::Idle);
    }

    fn enter_recovery(&mut self, similarity: f32) {
        info!(
            "Deviation at waypoint {} after {} low frames",
            self.current_index,
            self.deviation.consecutive()
        );
        self.status.bump_epoch();
        self.recovery.reset();
        self.sink.emit(NavEvent::DeviationDetected {
            low_frames: self.deviation.consecutive(),
            similarity,
        });
        self.deviation.reset();
        self.log(NavigationLogKind::DeviationDetected);
        self.transition(NavPhase::AwaitingManualCapture);
    }

    /// Move forward to `index`; never moves backwards.
    fn advance_to(&mut self, index: usize) {
        if index <= self.current_index {
            return;
        }
        self.current_index = index;
        self.publish_progress();
        let Some(route) = &self.route else {
            return;
        };
        let total = route.len();
        let instruction = instruction_for(route, index);
        let percentage = self.progress_percentage();
        self.sink.emit(NavEvent::Progress {
            index,
            total,
            percentage,
        });
        self.log(NavigationLogKind::Advanced);

        if index + 1 >= total {
            self.arrive();
        } else {
            self.sink.emit(NavEvent::Instruction(instruction));
        }
    }

    fn arrive(&mut self) {
        let Some(route) = &self.route else {
            return;
        };
        let destination = route.end_name.clone();
        self.current_index = route.len() - 1;
        info!("Destination reached: {}", destination);

        self.status.bump_epoch();
        self.publish_progress();
        self.transition(NavPhase::DestinationReached);
        self.sink.emit(NavEvent::DestinationReached { destination });
        self.log(NavigationLogKind::Arrived);
    }

    fn transition(&mut self, to: NavPhase) {
        if self.phase == to {
            return;
        }
        let from = self.phase;
        debug!("Navigation {} -> {}", from.as_str(), to.as_str());
        self.phase = to;
        self.status.set_phase(to);
        self.sink.emit(NavEvent::PhaseChanged { from, to });
    }

    fn publish_progress(&self) {
        self.status.set_progress(self.progress_percentage());
    }

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.status.epoch()
    }

    fn log(&self, kind: NavigationLogKind) {
        let (Some(store), Some(route)) = (&self.store, &self.route) else {
            return;
        };
        let entry = NavigationLogEntry {
            path_id: route.path.id,
            kind,
            waypoint_index: self.current_index,
            timestamp_ms: now_ms(),
        };
        if let Err(e) = store.log_navigation(entry) {
            warn!("Failed to write navigation log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MapId, NavigationPath, NodeId, PathId, Waypoint, WaypointDraft, WaypointId};
    use crate::store::MemoryStore;
    use approx::assert_relative_eq;
    use crossbeam_channel::Receiver;

    /// First byte of the frame selects a basis vector; empty frames fail.
    struct BasisEmbedder;

    impl Embedder for BasisEmbedder {
        fn embed(&self, frame: &Frame) -> Result<Embedding> {
            let Some(&axis) = frame.data.first() else {
                return Err(MargaError::Embedding("empty frame".into()));
            };
            let mut v = vec![0.0; 16];
            v[axis as usize] = 1.0;
            Embedding::new(v)
        }
    }

    fn frame(axis: u8) -> Frame {
        Frame::new(vec![axis], axis as u64, 0)
    }

    /// Waypoint `i` looks like basis vector `i`.
    fn route(len: usize) -> NavigationRoute {
        let waypoints = (0..len)
            .map(|i| {
                let mut v = vec![0.0; 16];
                v[i] = 1.0;
                Waypoint {
                    id: WaypointId(i as u64 + 1),
                    path_id: PathId(1),
                    data: WaypointDraft {
                        sequence_number: i as u32,
                        embedding: Embedding::new(v).unwrap(),
                        heading: 90.0,
                        heading_change: 0.0,
                        turn: TurnDirection::Straight,
                        is_decision_point: false,
                        landmark: None,
                        distance_from_previous_m: None,
                        timestamp_ms: 0,
                    },
                }
            })
            .collect();
        NavigationRoute {
            path: NavigationPath {
                id: PathId(1),
                map_id: MapId(1),
                name: "Lobby to Lab".into(),
                start_node: NodeId(1),
                end_node: NodeId(2),
                estimated_distance_m: 12.0,
                estimated_steps: 18,
                created_at_ms: 0,
            },
            waypoints,
            start_name: "Lobby".into(),
            end_name: "Lab".into(),
            distance_text: "12 m".into(),
            duration_text: "< 1 min".into(),
        }
    }

    const LOST: u8 = 15;

    fn machine() -> (NavigationStateMachine, Receiver<NavEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let m = NavigationStateMachine::new(
            NavigationConfig::default(),
            Arc::new(BasisEmbedder),
            Box::new(tx),
        );
        (m, rx)
    }

    fn navigating(len: usize) -> (NavigationStateMachine, Receiver<NavEvent>) {
        let (mut m, rx) = machine();
        m.start(route(len)).unwrap();
        m.on_heading(92.0);
        assert_eq!(m.phase(), NavPhase::Navigating);
        (m, rx)
    }

    fn epoch(m: &NavigationStateMachine) -> u64 {
        m.status_handle().epoch()
    }

    #[test]
    fn test_rejected_route_reports_status() {
        let (mut m, rx) = machine();
        let result = m.start(route(0));

        assert!(matches!(result, Err(MargaError::InvalidRecord(_))));
        assert_eq!(m.phase(), NavPhase::Idle);
        let events: Vec<NavEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], NavEvent::Status { message } if message.contains("no waypoints")));
    }

    #[test]
    fn test_orientation_requires_alignment() {
        let (mut m, rx) = machine();
        m.start(route(4)).unwrap();
        assert_eq!(m.phase(), NavPhase::InitialOrientation);
        assert_relative_eq!(m.target_heading(), 90.0);

        m.on_heading(40.0);
        assert_eq!(m.phase(), NavPhase::InitialOrientation);
        let hint = rx
            .try_iter()
            .find_map(|e| match e {
                NavEvent::OrientationHint { difference, turn, .. } => Some((difference, turn)),
                _ => None,
            })
            .unwrap();
        assert_relative_eq!(hint.0, 50.0);
        assert_eq!(hint.1, TurnDirection::Right);

        m.on_heading(94.0);
        assert_eq!(m.phase(), NavPhase::Navigating);
    }

    #[test]
    fn test_forward_matches_advance() {
        let (mut m, _rx) = navigating(4);
        let e = epoch(&m);

        m.on_frame(e, &frame(2));
        assert_eq!(m.current_index(), 2);
        assert_relative_eq!(m.progress_percentage(), 200.0 / 3.0, epsilon = 1e-4);

        // Matching the start again never moves backwards
        m.on_frame(e, &frame(0));
        assert_eq!(m.current_index(), 2);

        m.on_frame(e, &frame(3));
        assert_eq!(m.phase(), NavPhase::DestinationReached);
        assert_relative_eq!(m.progress_percentage(), 100.0);
        assert_relative_eq!(m.status_handle().progress(), 100.0);
    }

    #[test]
    fn test_low_frames_enter_recovery() {
        let (mut m, rx) = navigating(4);
        let e = epoch(&m);
        m.on_frame(e, &frame(LOST));
        m.on_frame(e, &frame(LOST));
        assert_eq!(m.phase(), NavPhase::Navigating);
        m.on_frame(e, &frame(LOST));
        assert_eq!(m.phase(), NavPhase::AwaitingManualCapture);
        assert!(
            rx.try_iter()
                .any(|e| matches!(e, NavEvent::DeviationDetected { low_frames: 3, .. }))
        );

        // Ticker frames requested before the deviation are now stale
        assert_ne!(epoch(&m), e);
        assert!(!m.status_handle().wants_samples());
    }

    #[test]
    fn test_stale_frames_are_dropped() {
        let (mut m, _rx) = navigating(4);
        let old = epoch(&m);
        m.stop();
        m.start(route(4)).unwrap();
        m.on_heading(90.0);

        m.on_frame(old, &frame(2));
        assert_eq!(m.current_index(), 0);
    }

    #[test]
    fn test_recovery_success_relocalizes_forward_only() {
        let (mut m, rx) = navigating(6);
        let e = epoch(&m);
        m.on_frame(e, &frame(1));
        for _ in 0..3 {
            m.on_frame(e, &frame(LOST));
        }
        assert_eq!(m.phase(), NavPhase::AwaitingManualCapture);

        let e = epoch(&m);
        m.begin_manual_capture().unwrap();
        m.on_manual_frame(e, &frame(LOST)).unwrap();
        m.on_manual_frame(e, &frame(4)).unwrap();
        assert_eq!(m.phase(), NavPhase::ManualCaptureInProgress);
        m.on_manual_frame(e, &frame(LOST)).unwrap();

        assert_eq!(m.phase(), NavPhase::Navigating);
        assert_eq!(m.current_index(), 4);
        assert!(
            rx.try_iter()
                .any(|e| matches!(e, NavEvent::Relocalized { index: 4, .. }))
        );
    }

    #[test]
    fn test_recovery_exhaustion_returns_to_idle() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut m = NavigationStateMachine::new(
            NavigationConfig::default(),
            Arc::new(BasisEmbedder),
            Box::new(tx),
        )
        .with_store(store.clone());
        m.start(route(4)).unwrap();
        m.on_heading(90.0);
        let e = epoch(&m);
        for _ in 0..3 {
            m.on_frame(e, &frame(LOST));
        }

        for attempt in 1..=3u32 {
            let e = epoch(&m);
            let mut result = Ok(());
            for _ in 0..3 {
                result = m.on_manual_frame(e, &frame(LOST));
            }
            if attempt < 3 {
                assert!(result.is_ok());
                assert_eq!(m.phase(), NavPhase::AwaitingManualCapture);
                assert_eq!(m.recovery_attempts(), attempt);
            } else {
                assert!(matches!(result, Err(MargaError::LocalizationLost { attempts: 3 })));
            }
        }
        assert_eq!(m.phase(), NavPhase::Idle);
        assert!(m.route().is_none());
        assert!(
            rx.try_iter()
                .any(|e| matches!(e, NavEvent::LocalizationLost { attempts: 3, .. }))
        );
        let kinds: Vec<_> = store.navigation_log().iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NavigationLogKind::Started,
                NavigationLogKind::DeviationDetected,
                NavigationLogKind::LocalizationLost
            ]
        );
    }

    #[test]
    fn test_manual_frame_outside_recovery_is_invalid() {
        let (mut m, _rx) = navigating(4);
        let e = epoch(&m);
        assert!(matches!(
            m.on_manual_frame(e, &frame(1)),
            Err(MargaError::InvalidState { .. })
        ));
        assert!(m.begin_manual_capture().is_err());
    }

    #[test]
    fn test_single_waypoint_route_arrives_on_first_frame() {
        let (mut m, rx) = navigating(1);
        assert_relative_eq!(m.progress_percentage(), 100.0);
        let e = epoch(&m);
        m.on_frame(e, &frame(LOST));
        assert_eq!(m.phase(), NavPhase::DestinationReached);
        assert!(rx.try_iter().any(|e| matches!(
            e,
            NavEvent::DestinationReached { ref destination } if destination == "Lab"
        )));
    }

    #[test]
    fn test_empty_route_rejected() {
        let (mut m, _rx) = machine();
        assert!(matches!(
            m.start(route(0)),
            Err(MargaError::InvalidRecord(_))
        ));
        assert_eq!(m.phase(), NavPhase::Idle);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut m, rx) = navigating(3);
        m.stop();
        m.stop();
        assert_eq!(m.phase(), NavPhase::Idle);
        let idle_transitions = rx
            .try_iter()
            .filter(|e| matches!(e, NavEvent::PhaseChanged { to: NavPhase::Idle, .. }))
            .count();
        assert_eq!(idle_transitions, 1);
    }

    #[test]
    fn test_embedding_failure_reports_status() {
        let (mut m, rx) = navigating(3);
        let e = epoch(&m);
        m.on_frame(e, &Frame::new(Vec::<u8>::new(), 9, 0));
        assert_eq!(m.phase(), NavPhase::Navigating);
        assert!(rx.try_iter().any(|e| matches!(e, NavEvent::Status { .. })));
    }
}
