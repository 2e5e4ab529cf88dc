//! Navigation thread: owns the state machine and applies commands in order.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use super::NavCommand;
use crate::navigation::NavigationStateMachine;

/// How long to wait for a command before re-checking the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Navigation thread state and logic.
pub struct NavigationThread {
    machine: NavigationStateMachine,
    commands: Receiver<NavCommand>,
    handled: u64,
}

impl NavigationThread {
    pub fn new(machine: NavigationStateMachine, commands: Receiver<NavCommand>) -> Self {
        Self {
            machine,
            commands,
            handled: 0,
        }
    }

    /// Run the navigation thread main loop.
    pub fn run(&mut self) {
        info!("Navigation thread started");
        let status = self.machine.status_handle();

        loop {
            if status.should_shutdown() {
                info!("Navigation thread shutting down");
                break;
            }

            match self.commands.recv_timeout(POLL_INTERVAL) {
                Ok(command) => {
                    self.handled += 1;
                    if !self.handle(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Command channel disconnected, navigation thread exiting");
                    break;
                }
            }
        }

        // In-flight captures must not land on a finished route
        self.machine.stop();
        info!("Navigation thread stopped after {} commands", self.handled);
    }

    /// Apply one command. Returns `false` when the thread should exit.
    fn handle(&mut self, command: NavCommand) -> bool {
        match command {
            NavCommand::Start(route) => {
                if let Err(e) = self.machine.start(*route) {
                    warn!("Cannot start navigation: {}", e);
                }
            }
            NavCommand::Heading(heading) => self.machine.on_heading(heading),
            NavCommand::Frame { epoch, frame } => self.machine.on_frame(epoch, &frame),
            NavCommand::CaptureNow => {
                if let Err(e) = self.machine.begin_manual_capture() {
                    debug!("Manual capture request ignored: {}", e);
                }
            }
            NavCommand::ManualFrame { epoch, frame } => {
                if let Err(e) = self.machine.on_manual_frame(epoch, &frame) {
                    warn!("Manual frame rejected: {}", e);
                }
            }
            NavCommand::Stop => self.machine.stop(),
            NavCommand::Shutdown => return false,
        }
        true
    }
}
