//! Captured frames and detector output.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{MargaError, Result};

/// One camera capture.
///
/// Image bytes are shared, so cloning a frame is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Encoded image bytes (JPEG from the device camera).
    pub data: Arc<[u8]>,
    /// Sequence number assigned by the camera coordinator.
    pub sequence: u64,
    /// Capture time (milliseconds since epoch).
    pub captured_at_ms: u64,
}

impl Frame {
    pub fn new(data: impl Into<Arc<[u8]>>, sequence: u64, captured_at_ms: u64) -> Self {
        Self {
            data: data.into(),
            sequence,
            captured_at_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Axis-aligned region in normalized image coordinates (`[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Result<Self> {
        let inside = |v: f32| (0.0..=1.0).contains(&v);
        if !(inside(x) && inside(y) && width > 0.0 && height > 0.0)
            || x + width > 1.0 + 1e-6
            || y + height > 1.0 + 1e-6
        {
            return Err(MargaError::InvalidRecord(format!(
                "bounding box ({}, {}, {}, {}) is outside the image",
                x, y, width, height
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Box spanning two corner points in any order, clamped to the image.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Result<Self> {
        let (left, right) = (x0.min(x1).clamp(0.0, 1.0), x0.max(x1).clamp(0.0, 1.0));
        let (top, bottom) = (y0.min(y1).clamp(0.0, 1.0), y0.max(y1).clamp(0.0, 1.0));
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// One object reported by the detector collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Result<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(MargaError::InvalidRecord("detection label is empty".into()));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MargaError::InvalidRecord(format!(
                "detection confidence {} outside [0, 1]",
                confidence
            )));
        }
        Ok(Self {
            label,
            confidence,
            bbox,
        })
    }
}
