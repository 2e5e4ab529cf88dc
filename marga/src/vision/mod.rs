//! Vision collaborators: embedding model, object detector and verification judge.
//!
//! The models themselves live outside this crate. The engine only depends on
//! these traits; the optional `gateway` feature provides an HTTP client for
//! the embedding gateway service.

#[cfg(feature = "gateway")]
mod gateway;

#[cfg(feature = "gateway")]
pub use gateway::{EmbedMode, GatewayClient, GatewayHealth, PeopleDetection};

use crate::core::{Detection, Embedding, Frame};
use crate::error::Result;

/// Image -> fixed-length vector.
///
/// Implementations must be deterministic for a given image and model version.
pub trait Embedder: Send + Sync {
    fn embed(&self, frame: &Frame) -> Result<Embedding>;
}

/// Image -> detected regions.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Answer from the verification judge.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Confidence in `[0, 1]` that the frame shows the candidate location.
    pub confidence: f32,
    pub reasoning: String,
}

/// Secondary check of a localization candidate (vision-language model).
pub trait VerificationJudge: Send + Sync {
    fn judge(&self, frame: &Frame, candidate_label: &str) -> Result<Verdict>;
}
