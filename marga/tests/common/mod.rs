//! Fixtures shared by the integration tests.
//!
//! Frames carry a one-byte "scene id"; [`SceneEmbedder`] maps each scene to a
//! fixed vector so tests control similarities exactly.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use marga::camera::FrameSource;
use marga::core::{Embedding, Frame};
use marga::sensors::StepCounter;
use marga::{Embedder, MargaError, Result};

pub const DIM: usize = 16;

/// Unit vector along `axis`.
pub fn basis(axis: usize) -> Embedding {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    Embedding::new(v).unwrap()
}

/// Unit vector with cosine similarity `cos` to `basis(axis)`, tilted towards
/// `basis(other)`.
pub fn tilted(axis: usize, other: usize, cos: f32) -> Embedding {
    let mut v = vec![0.0; DIM];
    v[axis] = cos;
    v[other] = (1.0 - cos * cos).sqrt();
    Embedding::new(v).unwrap()
}

pub fn frame(scene: u8) -> Frame {
    Frame::new(vec![scene], scene as u64, 0)
}

/// Scene id -> embedding. Unknown scenes fail to embed.
#[derive(Default)]
pub struct SceneEmbedder {
    scenes: HashMap<u8, Embedding>,
}

impl SceneEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(mut self, id: u8, embedding: Embedding) -> Self {
        self.scenes.insert(id, embedding);
        self
    }

    /// Scenes `0..n` map to `basis(0..n)`.
    pub fn basis_scenes(n: usize) -> Self {
        (0..n).fold(Self::new(), |e, i| e.scene(i as u8, basis(i)))
    }
}

impl Embedder for SceneEmbedder {
    fn embed(&self, frame: &Frame) -> Result<Embedding> {
        let scene = frame
            .data
            .first()
            .ok_or_else(|| MargaError::Embedding("empty frame".into()))?;
        self.scenes
            .get(scene)
            .cloned()
            .ok_or_else(|| MargaError::Embedding(format!("unknown scene {}", scene)))
    }
}

/// Camera whose picture is whatever scene the test last set.
pub struct SceneCamera {
    scene: AtomicU8,
    delay: Duration,
}

impl SceneCamera {
    pub fn new(scene: u8) -> Arc<Self> {
        Arc::new(Self {
            scene: AtomicU8::new(scene),
            delay: Duration::ZERO,
        })
    }

    pub fn slow(scene: u8, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scene: AtomicU8::new(scene),
            delay,
        })
    }

    pub fn show(&self, scene: u8) {
        self.scene.store(scene, Ordering::SeqCst);
    }
}

impl FrameSource for SceneCamera {
    fn capture(&self) -> Result<Vec<u8>> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(vec![self.scene.load(Ordering::SeqCst)])
    }
}

/// Pedometer that always reports the same reading.
pub struct FixedSteps(pub u64);

impl StepCounter for FixedSteps {
    fn current_steps(&self) -> Result<u64> {
        Ok(self.0)
    }
}

/// Poll `cond` for up to three seconds.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}
