//! Fixed-length visual embeddings and cosine similarity.

use serde::{Deserialize, Serialize};

use crate::error::{MargaError, Result};

/// Embedding length produced by the default model.
pub const EMBEDDING_DIM: usize = 512;

/// A validated embedding vector.
///
/// Construction rejects empty vectors and non-finite components, so every
/// `Embedding` in the system can be compared without further checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    values: Vec<f32>,
    norm: f32,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(MargaError::InvalidRecord("embedding is empty".into()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MargaError::InvalidRecord(
                "embedding contains non-finite values".into(),
            ));
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        Ok(Self { values, norm })
    }

    /// Construct and check the length against the configured dimension.
    pub fn with_dim(values: Vec<f32>, dim: usize) -> Result<Self> {
        if values.len() != dim {
            return Err(MargaError::InvalidRecord(format!(
                "embedding has {} dimensions, expected {}",
                values.len(),
                dim
            )));
        }
        Self::new(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.norm
    }

    /// Cosine similarity clamped to `[0, 1]`.
    ///
    /// Mismatched lengths and zero vectors have similarity 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() || self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let dot: f32 = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .sum();
        (dot / (self.norm * other.norm)).clamp(0.0, 1.0)
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = MargaError;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Embedding::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(e: Embedding) -> Self {
        e.values
    }
}
