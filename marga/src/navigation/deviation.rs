//! Off-route detection.
//!
//! Counts consecutive frames whose similarity to the expected next waypoint
//! stays below a threshold. One good frame resets the count, so a single
//! blurry capture never triggers recovery on its own.

use tracing::debug;

/// Consecutive low-similarity counter.
#[derive(Debug, Clone)]
pub struct DeviationDetector {
    /// Similarity below which a frame counts as off-route.
    threshold: f32,
    /// Consecutive low frames that constitute a deviation.
    required: usize,
    consecutive: usize,
}

impl DeviationDetector {
    pub fn new(threshold: f32, required: usize) -> Self {
        Self {
            threshold,
            required: required.max(1),
            consecutive: 0,
        }
    }

    /// Feed the similarity of one frame to the expected next waypoint.
    ///
    /// # Returns
    /// `true` exactly when this frame completes a deviation.
    pub fn observe(&mut self, similarity: f32) -> bool {
        if similarity >= self.threshold {
            if self.consecutive > 0 {
                debug!("Back on route after {} low frames", self.consecutive);
            }
            self.consecutive = 0;
            return false;
        }
        self.consecutive += 1;
        debug!(
            "Low similarity {:.3} to next waypoint ({}/{})",
            similarity, self.consecutive, self.required
        );
        self.consecutive == self.required
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triggers_after_required_frames() {
        let mut d = DeviationDetector::new(0.6, 3);
        assert!(!d.observe(0.2));
        assert!(!d.observe(0.3));
        assert!(d.observe(0.1));
        assert_eq!(d.consecutive(), 3);
    }

    #[test]
    fn test_good_frame_resets() {
        let mut d = DeviationDetector::new(0.6, 3);
        d.observe(0.2);
        d.observe(0.2);
        assert!(!d.observe(0.8));
        assert!(!d.observe(0.2));
        assert!(!d.observe(0.2));
        assert!(d.observe(0.2));
    }

    #[test]
    fn test_zero_required_treated_as_one() {
        let mut d = DeviationDetector::new(0.6, 0);
        assert!(d.observe(0.0));
    }
}
