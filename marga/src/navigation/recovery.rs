//! Manual recovery bookkeeping.
//!
//! Recovery collects a fixed number of manual frames, analyzes them together,
//! and either relocalizes or counts a failed attempt. Attempts are bounded:
//! after `max_attempts` failures the route is abandoned.

use crate::core::Embedding;

/// Manual frames collected per recovery attempt.
pub const MANUAL_CAPTURE_FRAMES: usize = 3;

/// Result of recording a failed analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Try again; carries the attempt number that just failed (1-based).
    Retry { attempt: u32 },
    /// Out of attempts.
    Exhausted { attempts: u32 },
}

/// Frames and attempt counter for the current recovery.
#[derive(Debug, Clone)]
pub struct RecoveryTracker {
    max_attempts: u32,
    attempts: u32,
    frames: Vec<Embedding>,
}

impl RecoveryTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempts: 0,
            frames: Vec::with_capacity(MANUAL_CAPTURE_FRAMES),
        }
    }

    /// Keep one manual frame.
    ///
    /// # Returns
    /// Number of frames collected in this attempt
    pub fn add_frame(&mut self, embedding: Embedding) -> usize {
        if self.frames.len() < MANUAL_CAPTURE_FRAMES {
            self.frames.push(embedding);
        }
        self.frames.len()
    }

    pub fn frames_collected(&self) -> usize {
        self.frames.len()
    }

    pub fn is_ready(&self) -> bool {
        self.frames.len() >= MANUAL_CAPTURE_FRAMES
    }

    /// Hand the collected frames to analysis and start a fresh collection.
    pub fn take_frames(&mut self) -> Vec<Embedding> {
        std::mem::take(&mut self.frames)
    }

    pub fn record_failure(&mut self) -> RecoveryOutcome {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            RecoveryOutcome::Exhausted {
                attempts: self.attempts,
            }
        } else {
            RecoveryOutcome::Retry {
                attempt: self.attempts,
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Forget frames and attempts (success, stop or new route).
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.frames.clear();
    }
}
