//! Guided navigation: deviation, bounded recovery, monotonic progress and
//! the threaded session driver.

mod common;

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use crossbeam_channel::Receiver;
use marga::config::{MargaConfig, NavigationConfig};
use marga::core::{PathDraft, TurnDirection, WaypointDraft};
use marga::navigation::NavigationStateMachine;
use marga::{
    CameraAccessCoordinator, MargaError, MemoryStore, NavEvent, NavPhase, NavigationRoute,
    NavigationSession, PathStore, RouteMatcher,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{SceneCamera, SceneEmbedder, basis, frame, wait_until};

const WAYPOINTS: usize = 5;
const LOST: u8 = 15;

/// Route whose waypoint `i` looks like scene `i`, heading east.
fn taught_route() -> (Arc<MemoryStore>, NavigationRoute) {
    let store = Arc::new(MemoryStore::new());
    let map = store.add_map("Office").unwrap();
    let lobby = store.add_node(map, "Lobby", 0.0, 0.0, None).unwrap();
    let lab = store.add_node(map, "Lab", 12.0, 0.0, None).unwrap();
    let waypoints = (0..WAYPOINTS)
        .map(|i| WaypointDraft {
            sequence_number: i as u32,
            embedding: basis(i),
            heading: 90.0,
            heading_change: 0.0,
            turn: if i == 2 {
                TurnDirection::Left
            } else {
                TurnDirection::Straight
            },
            is_decision_point: i == 2,
            landmark: (i == 2).then(|| "Door".to_string()),
            distance_from_previous_m: (i > 0).then_some(3.0),
            timestamp_ms: i as u64,
        })
        .collect();
    store
        .insert_path(PathDraft {
            map_id: map,
            name: "Lobby to Lab".into(),
            start_node: lobby,
            end_node: lab,
            estimated_distance_m: 12.0,
            estimated_steps: 18,
            waypoints,
        })
        .unwrap();

    let route = RouteMatcher::new(store.clone(), 1.2)
        .available_routes(lobby)
        .unwrap()
        .remove(0);
    (store, route)
}

fn machine(store: &Arc<MemoryStore>) -> (NavigationStateMachine, Receiver<NavEvent>) {
    machine_with(store, NavigationConfig::default())
}

fn machine_with(
    store: &Arc<MemoryStore>,
    config: NavigationConfig,
) -> (NavigationStateMachine, Receiver<NavEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let machine = NavigationStateMachine::new(
        config,
        Arc::new(SceneEmbedder::basis_scenes(16)),
        Box::new(tx),
    )
    .with_store(store.clone());
    (machine, rx)
}

fn phases(rx: &Receiver<NavEvent>) -> Vec<NavPhase> {
    rx.try_iter()
        .filter_map(|e| match e {
            NavEvent::PhaseChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect()
}

#[test]
fn test_three_low_frames_trigger_manual_capture() {
    let (store, route) = taught_route();
    let (mut nav, rx) = machine(&store);
    nav.start(route).unwrap();
    nav.on_heading(91.0);

    let epoch = nav.status_handle().epoch();
    for _ in 0..3 {
        nav.on_frame(epoch, &frame(LOST));
    }

    assert_eq!(nav.phase(), NavPhase::AwaitingManualCapture);
    assert_eq!(
        phases(&rx),
        vec![
            NavPhase::InitialOrientation,
            NavPhase::Navigating,
            NavPhase::AwaitingManualCapture
        ]
    );
}

#[test]
fn test_recovery_gives_up_after_max_attempts() {
    let (store, route) = taught_route();
    let (mut nav, rx) = machine(&store);
    nav.start(route).unwrap();
    nav.on_heading(90.0);
    let epoch = nav.status_handle().epoch();
    for _ in 0..3 {
        nav.on_frame(epoch, &frame(LOST));
    }

    let max = NavigationConfig::default().max_recovery_attempts;
    let mut last = Ok(());
    for _ in 0..max {
        assert!(nav.phase().is_recovering());
        let epoch = nav.status_handle().epoch();
        nav.begin_manual_capture().unwrap();
        for _ in 0..3 {
            last = nav.on_manual_frame(epoch, &frame(LOST));
        }
    }

    assert!(matches!(last, Err(MargaError::LocalizationLost { attempts }) if attempts == max));
    assert_eq!(nav.phase(), NavPhase::Idle);
    let failures = rx
        .try_iter()
        .filter(|e| matches!(e, NavEvent::RecoveryAttemptFailed { .. }))
        .count();
    assert_eq!(failures, max as usize);
}

#[test]
fn test_progress_never_decreases() {
    let (store, route) = taught_route();
    let (mut nav, _rx) = machine(&store);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        nav.start(route.clone()).unwrap();
        nav.on_heading(90.0);
        let mut last = nav.progress_percentage();

        for _ in 0..60 {
            let scene = if rng.gen_bool(0.3) {
                LOST
            } else {
                rng.gen_range(0..WAYPOINTS as u8)
            };
            let epoch = nav.status_handle().epoch();
            match nav.phase() {
                NavPhase::Navigating => nav.on_frame(epoch, &frame(scene)),
                phase if phase.is_recovering() => {
                    let _ = nav.on_manual_frame(epoch, &frame(scene));
                }
                _ => break,
            }
            if nav.phase() == NavPhase::Idle {
                break;
            }
            let progress = nav.progress_percentage();
            assert!(progress >= last, "progress went from {} to {}", last, progress);
            last = progress;
        }
    }
}

#[test]
fn test_instructions_follow_the_route() {
    let (store, route) = taught_route();
    let (mut nav, rx) = machine(&store);
    nav.start(route).unwrap();
    nav.on_heading(90.0);
    let epoch = nav.status_handle().epoch();
    nav.on_frame(epoch, &frame(1));
    nav.on_frame(epoch, &frame(4));

    let texts: Vec<String> = rx
        .try_iter()
        .filter_map(|e| match e {
            NavEvent::Instruction(i) => Some(i.text),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["Continue straight", "Turn left at Door"]);
    assert_eq!(nav.phase(), NavPhase::DestinationReached);
    assert_relative_eq!(nav.progress_percentage(), 100.0);
}

fn session_config() -> MargaConfig {
    let mut config = MargaConfig::default();
    config.navigation.sample_interval_ms = 10;
    config.camera.capture_timeout_ms = 500;
    config
}

#[test]
fn test_session_walks_to_destination() {
    let (store, route) = taught_route();
    // Standing still between matches must not count as a deviation here
    let config = NavigationConfig {
        consecutive_low_frames: 10_000,
        ..NavigationConfig::default()
    };
    let (nav, rx) = machine_with(&store, config);
    let camera = SceneCamera::new(0);
    let coordinator = CameraAccessCoordinator::new(camera.clone());
    let mut session = NavigationSession::spawn(nav, coordinator.clone(), &session_config()).unwrap();

    session.start(route).unwrap();
    assert!(wait_until(|| session.phase() == NavPhase::InitialOrientation));
    // No samples while orienting
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(coordinator.stats().completed, 0);

    session.heading(90.0);
    assert!(wait_until(|| session.phase() == NavPhase::Navigating));

    camera.show(2);
    assert!(wait_until(|| session.progress() >= 50.0));
    camera.show(4);
    assert!(wait_until(|| session.phase() == NavPhase::DestinationReached));
    assert_relative_eq!(session.progress(), 100.0);

    session.shutdown();
    assert!(
        rx.try_iter()
            .any(|e| matches!(e, NavEvent::DestinationReached { .. }))
    );
    let kinds: Vec<_> = store.navigation_log().iter().map(|l| l.kind).collect();
    assert!(kinds.contains(&marga::store::NavigationLogKind::Arrived));
}

#[test]
fn test_session_manual_recovery() {
    let (store, route) = taught_route();
    let (nav, _rx) = machine(&store);
    let camera = SceneCamera::new(LOST);
    let coordinator = CameraAccessCoordinator::new(camera.clone());
    let mut session = NavigationSession::spawn(nav, coordinator, &session_config()).unwrap();

    // Not recovering yet
    assert!(matches!(
        session.capture_now(),
        Err(MargaError::InvalidState { .. })
    ));

    session.start(route).unwrap();
    session.heading(90.0);
    assert!(wait_until(|| session.phase() == NavPhase::AwaitingManualCapture));
    assert_relative_eq!(session.progress(), 0.0);

    camera.show(3);
    for _ in 0..3 {
        // A periodic capture may still be finishing
        assert!(wait_until(|| session.capture_now().is_ok()));
    }
    // Relocalized at waypoint 3 of 0..=4
    assert!(wait_until(|| session.progress() >= 75.0));

    session.stop().unwrap();
    assert!(wait_until(|| session.phase() == NavPhase::Idle));
    session.shutdown();
    session.shutdown();
}

#[test]
fn test_session_rejects_empty_route() {
    let (store, mut route) = taught_route();
    route.waypoints.clear();
    let (nav, _rx) = machine(&store);
    let coordinator = CameraAccessCoordinator::new(SceneCamera::new(0));
    let mut session = NavigationSession::spawn(nav, coordinator, &session_config()).unwrap();

    assert!(matches!(
        session.start(route),
        Err(MargaError::InvalidRecord(_))
    ));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(session.phase(), NavPhase::Idle);
    session.shutdown();
    assert!(store.navigation_log().is_empty());
}
