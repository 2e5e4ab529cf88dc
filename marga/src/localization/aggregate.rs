//! Combining per-frame similarity scores into one per-node score.

use serde::{Deserialize, Serialize};

/// Rule for aggregating a node's similarity over the frames of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreAggregation {
    /// Best single frame.
    #[default]
    Max,
    /// Average over all frames.
    Mean,
    /// Average of the `k` best frames (all frames if fewer than `k`).
    TopKMean { k: usize },
}

impl ScoreAggregation {
    /// Aggregate `scores`. An empty slice scores zero.
    pub fn aggregate(&self, scores: &[f32]) -> f32 {
        if scores.is_empty() {
            return 0.0;
        }
        match *self {
            ScoreAggregation::Max => scores.iter().copied().fold(0.0, f32::max),
            ScoreAggregation::Mean => scores.iter().sum::<f32>() / scores.len() as f32,
            ScoreAggregation::TopKMean { k } => {
                let mut sorted = scores.to_vec();
                sorted.sort_by(|a, b| b.total_cmp(a));
                let take = k.clamp(1, sorted.len());
                sorted[..take].iter().sum::<f32>() / take as f32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SCORES: [f32; 4] = [0.2, 0.9, 0.5, 0.8];

    #[test]
    fn test_max() {
        assert_relative_eq!(ScoreAggregation::Max.aggregate(&SCORES), 0.9);
    }

    #[test]
    fn test_mean() {
        assert_relative_eq!(ScoreAggregation::Mean.aggregate(&SCORES), 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_top_k_mean() {
        let agg = ScoreAggregation::TopKMean { k: 2 };
        assert_relative_eq!(agg.aggregate(&SCORES), 0.85, epsilon = 1e-6);

        // k larger than the sample count averages everything
        let agg = ScoreAggregation::TopKMean { k: 10 };
        assert_relative_eq!(agg.aggregate(&SCORES), 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_scores() {
        assert_eq!(ScoreAggregation::Mean.aggregate(&[]), 0.0);
        assert_eq!(ScoreAggregation::TopKMean { k: 3 }.aggregate(&[]), 0.0);
    }
}
