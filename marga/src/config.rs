//! Configuration loading for Marga

use crate::error::{MargaError, Result};
use crate::localization::ScoreAggregation;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MargaConfig {
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub localization: LocalizationConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Teach-by-walking parameters
#[derive(Clone, Debug, Deserialize)]
pub struct RecordingConfig {
    /// Meters travelled per step (default: 0.65)
    #[serde(default = "default_stride_meters")]
    pub stride_meters: f32,

    /// Detector candidates below this confidence are never suggested (default: 0.7)
    #[serde(default = "default_suggestion_min_confidence")]
    pub suggestion_min_confidence: f32,

    /// Candidates closer than this along the walk collapse into one (default: 2.0m)
    #[serde(default = "default_suggestion_min_spacing")]
    pub suggestion_min_spacing_m: f32,

    /// Heading changes up to this magnitude are "straight" (default: 30°)
    #[serde(default = "default_straight_threshold")]
    pub straight_threshold_deg: f32,

    /// Heading changes from this magnitude are a u-turn (default: 150°)
    #[serde(default = "default_u_turn_threshold")]
    pub u_turn_threshold_deg: f32,
}

/// Position localization parameters
#[derive(Clone, Debug, Deserialize)]
pub struct LocalizationConfig {
    /// Minimum cosine similarity for a genuine match (default: 0.75)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Frames sampled by the automatic scan (default: 8)
    #[serde(default = "default_scan_samples")]
    pub scan_samples: usize,

    /// Delay between scan samples in milliseconds (default: 250)
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// How per-sample similarities are combined per node (default: max)
    #[serde(default)]
    pub aggregation: ScoreAggregation,

    /// Weight of the verification judge in the combined score (default: 0.4)
    #[serde(default = "default_judge_weight")]
    pub judge_weight: f32,

    /// Expected embedding length (default: 512)
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

/// Guided navigation parameters
#[derive(Clone, Debug, Deserialize)]
pub struct NavigationConfig {
    /// Heading error accepted before walking starts (default: 5°)
    #[serde(default = "default_orientation_tolerance")]
    pub orientation_tolerance_deg: f32,

    /// Periodic capture interval in milliseconds (default: 1000)
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Similarity a frame must exceed to advance progress (default: 0.75)
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Similarity to the expected next waypoint below which a frame counts
    /// as off-route (default: 0.6)
    #[serde(default = "default_deviation_threshold")]
    pub deviation_threshold: f32,

    /// Consecutive off-route frames before recovery starts (default: 3)
    #[serde(default = "default_consecutive_low_frames")]
    pub consecutive_low_frames: usize,

    /// Failed recovery analyses before giving up (default: 3)
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,

    /// Similarity required to accept a recovery relocalization (default: 0.7)
    #[serde(default = "default_recovery_match_threshold")]
    pub recovery_match_threshold: f32,

    /// Walking speed used for route duration estimates (default: 1.2 m/s)
    #[serde(default = "default_walking_speed")]
    pub walking_speed_mps: f32,

    /// Capacity of the navigation command channel (default: 16)
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

/// Camera access parameters
#[derive(Clone, Debug, Deserialize)]
pub struct CameraConfig {
    /// Upper bound on a single capture in milliseconds (default: 3000)
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

/// Embedding gateway connection settings
#[derive(Clone, Debug, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL (default: http://127.0.0.1:8000)
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// Request timeout in milliseconds (default: 10000)
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts for retryable failures (default: 3)
    #[serde(default = "default_gateway_retries")]
    pub max_retries: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            stride_meters: default_stride_meters(),
            suggestion_min_confidence: default_suggestion_min_confidence(),
            suggestion_min_spacing_m: default_suggestion_min_spacing(),
            straight_threshold_deg: default_straight_threshold(),
            u_turn_threshold_deg: default_u_turn_threshold(),
        }
    }
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            scan_samples: default_scan_samples(),
            scan_interval_ms: default_scan_interval_ms(),
            aggregation: ScoreAggregation::default(),
            judge_weight: default_judge_weight(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            orientation_tolerance_deg: default_orientation_tolerance(),
            sample_interval_ms: default_sample_interval_ms(),
            match_threshold: default_match_threshold(),
            deviation_threshold: default_deviation_threshold(),
            consecutive_low_frames: default_consecutive_low_frames(),
            max_recovery_attempts: default_max_recovery_attempts(),
            recovery_match_threshold: default_recovery_match_threshold(),
            walking_speed_mps: default_walking_speed(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            timeout_ms: default_gateway_timeout_ms(),
            max_retries: default_gateway_retries(),
        }
    }
}

// Recording defaults
fn default_stride_meters() -> f32 {
    0.65
}
fn default_suggestion_min_confidence() -> f32 {
    0.7
}
fn default_suggestion_min_spacing() -> f32 {
    2.0
}
fn default_straight_threshold() -> f32 {
    30.0
}
fn default_u_turn_threshold() -> f32 {
    150.0
}

// Localization defaults
fn default_similarity_threshold() -> f32 {
    0.75
}
fn default_scan_samples() -> usize {
    8
}
fn default_scan_interval_ms() -> u64 {
    250
}
fn default_judge_weight() -> f32 {
    0.4
}
fn default_embedding_dim() -> usize {
    crate::core::EMBEDDING_DIM
}

// Navigation defaults
fn default_orientation_tolerance() -> f32 {
    5.0
}
fn default_sample_interval_ms() -> u64 {
    1000
}
fn default_match_threshold() -> f32 {
    0.75
}
fn default_deviation_threshold() -> f32 {
    0.6
}
fn default_consecutive_low_frames() -> usize {
    3
}
fn default_max_recovery_attempts() -> u32 {
    3
}
fn default_recovery_match_threshold() -> f32 {
    0.7
}
fn default_walking_speed() -> f32 {
    1.2
}
fn default_command_capacity() -> usize {
    16
}

fn default_capture_timeout_ms() -> u64 {
    3000
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_gateway_timeout_ms() -> u64 {
    10_000
}
fn default_gateway_retries() -> usize {
    3
}

impl MargaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MargaError::Config(format!("Failed to read config file: {}", e)))?;
        let config: MargaConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        let r = &self.recording;
        if r.stride_meters <= 0.0 {
            return Err(MargaError::Config("recording.stride_meters must be > 0".into()));
        }
        check_unit("recording.suggestion_min_confidence", r.suggestion_min_confidence)?;
        if r.suggestion_min_spacing_m < 0.0 {
            return Err(MargaError::Config(
                "recording.suggestion_min_spacing_m must be >= 0".into(),
            ));
        }
        if !(0.0..=180.0).contains(&r.straight_threshold_deg)
            || !(r.straight_threshold_deg..=180.0).contains(&r.u_turn_threshold_deg)
        {
            return Err(MargaError::Config(
                "recording turn thresholds must satisfy 0 <= straight <= u_turn <= 180".into(),
            ));
        }

        let l = &self.localization;
        check_unit("localization.similarity_threshold", l.similarity_threshold)?;
        check_unit("localization.judge_weight", l.judge_weight)?;
        if l.scan_samples == 0 {
            return Err(MargaError::Config("localization.scan_samples must be >= 1".into()));
        }
        if l.embedding_dim == 0 {
            return Err(MargaError::Config("localization.embedding_dim must be >= 1".into()));
        }
        if let ScoreAggregation::TopKMean { k } = l.aggregation
            && k == 0
        {
            return Err(MargaError::Config("localization.aggregation.k must be >= 1".into()));
        }

        let n = &self.navigation;
        if !(0.0..=180.0).contains(&n.orientation_tolerance_deg) {
            return Err(MargaError::Config(
                "navigation.orientation_tolerance_deg must be within [0, 180]".into(),
            ));
        }
        check_unit("navigation.match_threshold", n.match_threshold)?;
        check_unit("navigation.deviation_threshold", n.deviation_threshold)?;
        check_unit("navigation.recovery_match_threshold", n.recovery_match_threshold)?;
        if n.sample_interval_ms == 0 {
            return Err(MargaError::Config("navigation.sample_interval_ms must be > 0".into()));
        }
        if n.consecutive_low_frames == 0 || n.max_recovery_attempts == 0 {
            return Err(MargaError::Config(
                "navigation.consecutive_low_frames and max_recovery_attempts must be >= 1".into(),
            ));
        }
        if n.walking_speed_mps <= 0.0 || n.command_capacity == 0 {
            return Err(MargaError::Config(
                "navigation.walking_speed_mps and command_capacity must be > 0".into(),
            ));
        }

        if self.camera.capture_timeout_ms == 0 {
            return Err(MargaError::Config("camera.capture_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

impl NavigationConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl LocalizationConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

impl CameraConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MargaError::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MargaConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.recording.stride_meters - 0.65).abs() < 1e-6);
        assert_eq!(config.navigation.consecutive_low_frames, 3);
        assert_eq!(config.localization.aggregation, ScoreAggregation::Max);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: MargaConfig = toml::from_str(
            r#"
            [recording]
            stride_meters = 0.7

            [localization]
            aggregation = { kind = "top_k_mean", k = 3 }
            "#,
        )
        .unwrap();

        assert!((config.recording.stride_meters - 0.7).abs() < 1e-6);
        assert!((config.recording.suggestion_min_confidence - 0.7).abs() < 1e-6);
        assert_eq!(
            config.localization.aggregation,
            ScoreAggregation::TopKMean { k: 3 }
        );
        assert_eq!(config.navigation.sample_interval_ms, 1000);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = MargaConfig::default();
        config.navigation.match_threshold = 1.5;
        assert!(matches!(config.validate(), Err(MargaError::Config(_))));

        let mut config = MargaConfig::default();
        config.navigation.max_recovery_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marga.toml");
        std::fs::write(&path, "[navigation]\nconsecutive_low_frames = 5\n").unwrap();

        let config = MargaConfig::load(&path).unwrap();
        assert_eq!(config.navigation.consecutive_low_frames, 5);
    }
}
