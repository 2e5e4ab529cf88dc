//! Step-count dead reckoning.
//!
//! Converts the raw pedometer counter into a walk-relative step count and a
//! distance using a fixed stride length. The counter is expected to be
//! monotonic but may restart (device reboot, app relaunch); a reading lower
//! than the previous one re-baselines instead of producing negative progress.

use tracing::{debug, warn};

/// Dead-reckoning tracker for one recording session.
#[derive(Debug, Clone)]
pub struct StepTracker {
    /// Meters per step
    stride_m: f32,
    /// Raw reading that corresponds to zero relative steps.
    /// Signed because a restart can move it below zero.
    baseline: i64,
    /// Last raw reading received (applied or not)
    last_raw: u64,
    /// Steps since the session started
    relative: u64,
    /// Whether updates are currently being ignored
    paused: bool,
    /// Number of counter restarts observed
    restarts: u32,
}

impl StepTracker {
    /// Create a tracker anchored at `baseline`.
    ///
    /// # Arguments
    /// * `stride_m` - Meters travelled per step
    /// * `baseline` - Raw counter value at session start
    pub fn new(stride_m: f32, baseline: u64) -> Self {
        Self {
            stride_m,
            baseline: baseline as i64,
            last_raw: baseline,
            relative: 0,
            paused: false,
            restarts: 0,
        }
    }

    /// Apply a raw counter reading.
    ///
    /// # Returns
    /// The relative step count after the update
    pub fn update(&mut self, raw: u64) -> u64 {
        if raw < self.last_raw {
            // Counter restarted: keep the progress made so far
            self.restarts += 1;
            self.baseline = raw as i64 - self.relative as i64;
            warn!(
                "Step counter restarted ({} -> {}), re-baselined at {}",
                self.last_raw, raw, self.baseline
            );
        }
        self.last_raw = raw;

        if self.paused {
            debug!("Step reading {} held while paused", raw);
            return self.relative;
        }

        let steps = (raw as i64 - self.baseline).max(self.relative as i64);
        self.relative = steps as u64;
        self.relative
    }

    /// Stop applying readings (checkpoint freeze).
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume applying readings; steps taken while paused are not counted.
    pub fn resume(&mut self) {
        if self.paused {
            self.baseline = self.last_raw as i64 - self.relative as i64;
            self.paused = false;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Steps since the session started.
    pub fn relative_steps(&self) -> u64 {
        self.relative
    }

    /// Distance walked in meters: `relative_steps * stride`.
    pub fn distance_m(&self) -> f32 {
        self.relative as f32 * self.stride_m
    }

    pub fn stride_m(&self) -> f32 {
        self.stride_m
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}
