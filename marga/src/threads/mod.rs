//! Threaded driver for guided navigation.
//!
//! Two threads cooperate:
//! - Navigation thread: owns the [`NavigationStateMachine`], applies commands
//! - Capture ticker: samples the camera while navigating, stamps each frame
//!   with the current epoch and forwards it as a command
//!
//! Manual recovery captures run on the caller's thread through the same
//! camera coordinator, so they can never overlap a periodic sample.

mod navigation;

pub use navigation::NavigationThread;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError, bounded};
use tracing::{debug, info, warn};

use crate::camera::{CameraAccessCoordinator, CapturePurpose, PeriodicCapture};
use crate::config::MargaConfig;
use crate::core::Frame;
use crate::error::{MargaError, Result};
use crate::navigation::{NavPhase, NavigationStateMachine, SharedNavStatus};
use crate::routes::NavigationRoute;

/// Upper bound on waiting for the navigation thread to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands consumed by the navigation thread.
#[derive(Debug)]
pub enum NavCommand {
    Start(Box<NavigationRoute>),
    Heading(f32),
    /// Periodic sample captured under `epoch`.
    Frame { epoch: u64, frame: Frame },
    /// User asked for a recovery capture.
    CaptureNow,
    /// Recovery capture taken under `epoch`.
    ManualFrame { epoch: u64, frame: Frame },
    Stop,
    Shutdown,
}

/// A running navigation session: thread handles plus the command side.
pub struct NavigationSession {
    commands: Sender<NavCommand>,
    status: Arc<SharedNavStatus>,
    camera: CameraAccessCoordinator,
    capture_timeout: Duration,
    ticker: Option<PeriodicCapture>,
    handle: Option<JoinHandle<()>>,
}

impl NavigationSession {
    /// Spawn the navigation thread and the capture ticker.
    pub fn spawn(
        machine: NavigationStateMachine,
        camera: CameraAccessCoordinator,
        config: &MargaConfig,
    ) -> Result<Self> {
        let status = machine.status_handle();
        let (tx, rx) = bounded::<NavCommand>(config.navigation.command_capacity.max(1));
        let capture_timeout = config.camera.capture_timeout();

        let handle = thread::Builder::new()
            .name("navigation".into())
            .spawn(move || {
                let mut navigation_thread = NavigationThread::new(machine, rx);
                navigation_thread.run();
            })
            .map_err(|e| MargaError::SensorUnavailable(format!("navigation thread: {}", e)))?;

        let gate_status = Arc::clone(&status);
        let frame_tx = tx.clone();
        let ticker = PeriodicCapture::spawn_gated(
            camera.clone(),
            CapturePurpose::NavigationSample,
            config.navigation.sample_interval(),
            capture_timeout,
            move || gate_status.wants_samples().then(|| gate_status.epoch()),
            move |epoch, frame| match frame_tx.try_send(NavCommand::Frame { epoch, frame }) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("Navigation thread behind, dropping sample");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        )?;

        info!("Navigation session started");
        Ok(Self {
            commands: tx,
            status,
            camera,
            capture_timeout,
            ticker: Some(ticker),
            handle: Some(handle),
        })
    }

    /// Queue a route. Routes that cannot be followed are rejected here, before
    /// the navigation thread sees them.
    pub fn start(&self, route: NavigationRoute) -> Result<()> {
        route.validate()?;
        self.send("start", NavCommand::Start(Box::new(route)))
    }

    /// Forward a compass reading. Dropped when the thread is behind.
    pub fn heading(&self, heading: f32) {
        if self.commands.try_send(NavCommand::Heading(heading)).is_err() {
            debug!("Heading {:.1} dropped", heading);
        }
    }

    /// Take one recovery frame and hand it to the navigation thread.
    ///
    /// Valid while recovering. Fails with `CameraBusy` when a periodic sample
    /// holds the camera; the caller simply tries again.
    pub fn capture_now(&self) -> Result<()> {
        let phase = self.status.phase();
        if !phase.is_recovering() {
            return Err(MargaError::invalid_state("capture_now", phase.as_str()));
        }
        let epoch = self.status.epoch();
        self.send("capture_now", NavCommand::CaptureNow)?;
        let frame = self
            .camera
            .capture_with_timeout(CapturePurpose::ManualRecovery, self.capture_timeout)?;
        self.send("capture_now", NavCommand::ManualFrame { epoch, frame })
    }

    pub fn stop(&self) -> Result<()> {
        self.send("stop", NavCommand::Stop)
    }

    pub fn phase(&self) -> NavPhase {
        self.status.phase()
    }

    pub fn progress(&self) -> f32 {
        self.status.progress()
    }

    pub fn status(&self) -> Arc<SharedNavStatus> {
        Arc::clone(&self.status)
    }

    /// Stop the ticker and the navigation thread. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.status.request_shutdown();
        let _ = self.commands.try_send(NavCommand::Shutdown);

        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if !handle.is_finished() {
            warn!("Navigation thread did not exit within {:?}", JOIN_TIMEOUT);
            return;
        }
        if handle.join().is_err() {
            warn!("Navigation thread panicked");
        }
        info!("Navigation session shut down");
    }

    fn send(&self, operation: &'static str, command: NavCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MargaError::invalid_state(operation, "shutdown"))
    }
}

impl Drop for NavigationSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
