//! Spoken guidance.
//!
//! Speech synthesis is slow and must never stall the navigation thread, so
//! announcements go through a bounded channel to a dedicated `voice` thread.
//! When the channel is full the announcement is dropped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError, bounded};
use tracing::{debug, info, warn};

use super::events::{EventSink, NavEvent};
use crate::error::{MargaError, Result};

/// Upper bound on waiting for queued speech when closing.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Text-to-speech collaborator.
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str);
}

/// Handle to the voice thread.
pub struct VoiceChannel {
    tx: Option<Sender<String>>,
    handle: Option<JoinHandle<()>>,
}

impl VoiceChannel {
    pub fn spawn(speaker: Arc<dyn Speaker>, capacity: usize) -> Result<Self> {
        let (tx, rx) = bounded::<String>(capacity.max(1));
        let handle = thread::Builder::new()
            .name("voice".into())
            .spawn(move || {
                info!("Voice thread started");
                // Ends when every sender is dropped
                for text in rx {
                    speaker.speak(&text);
                }
                info!("Voice thread stopped");
            })
            .map_err(|e| MargaError::SensorUnavailable(format!("voice thread: {}", e)))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue `text` for speaking. Returns `false` if it was dropped.
    pub fn say(&self, text: impl Into<String>) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(text.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(text)) => {
                debug!("Voice queue full, dropping \"{}\"", text);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Let queued announcements finish and stop the thread.
    ///
    /// Waits at most `CLOSE_TIMEOUT`; a speaker stuck past that is left
    /// running detached.
    pub fn close(&mut self) {
        self.tx.take();
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + CLOSE_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if !handle.is_finished() {
            warn!("Voice thread did not exit within {:?}", CLOSE_TIMEOUT);
            return;
        }
        if handle.join().is_err() {
            warn!("Voice thread panicked");
        }
    }
}

impl Drop for VoiceChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// What to say for an event, if anything.
pub fn announcement(event: &NavEvent) -> Option<String> {
    match event {
        NavEvent::Instruction(instruction) => Some(instruction.text.clone()),
        NavEvent::OrientationHint { aligned: true, .. } => {
            Some("Facing the right direction. Start walking.".to_string())
        }
        NavEvent::DeviationDetected { .. } => {
            Some("You may be off route. Capture your surroundings to continue.".to_string())
        }
        // The last failure is followed by LocalizationLost, which speaks instead
        NavEvent::RecoveryAttemptFailed {
            attempt,
            max_attempts,
            ..
        } if attempt < max_attempts => Some(format!(
            "Position not recognized, attempt {} of {}. Turn slightly and capture again.",
            attempt, max_attempts
        )),
        NavEvent::Relocalized { .. } => Some("Position found. Continue walking.".to_string()),
        NavEvent::LocalizationLost { message, .. } => Some(message.clone()),
        NavEvent::DestinationReached { destination } => {
            Some(format!("You have arrived at {}", destination))
        }
        NavEvent::Status { message } => Some(message.clone()),
        NavEvent::PhaseChanged { .. }
        | NavEvent::RecoveryAttemptFailed { .. }
        | NavEvent::Progress { .. }
        | NavEvent::OrientationHint { .. }
        | NavEvent::ManualFrameCaptured { .. } => None,
    }
}

/// Event sink that speaks announcements and forwards every event.
pub struct VoiceSink<S> {
    inner: S,
    voice: VoiceChannel,
}

impl<S: EventSink> VoiceSink<S> {
    pub fn new(inner: S, voice: VoiceChannel) -> Self {
        Self { inner, voice }
    }
}

impl<S: EventSink> EventSink for VoiceSink<S> {
    fn emit(&mut self, event: NavEvent) {
        if let Some(text) = announcement(&event) {
            self.voice.say(text);
        }
        self.inner.emit(event);
    }
}
