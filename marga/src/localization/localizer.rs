//! Position localization from live captures.
//!
//! Two protocols, both answering "which node am I standing at?":
//!
//! - **Directional**: one frame per cardinal direction (N, E, S, W). Each
//!   frame is searched independently; the single best entry over all four
//!   directions decides the node.
//! - **Scanning**: frames are sampled from the camera over a short window,
//!   per-node similarity is aggregated across frames, and an optional
//!   verification judge re-checks the winner on the best frame.
//!
//! Finding nothing is not an error: both return `Ok(None)` below the
//! similarity threshold.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::index::{IndexHit, WaypointIndex};
use crate::camera::{CameraAccessCoordinator, CaptureError, CapturePurpose};
use crate::config::LocalizationConfig;
use crate::core::{CardinalDirection, Embedding, Frame, MapId, NodeId};
use crate::error::{MargaError, Result};
use crate::vision::{Embedder, VerificationJudge};

/// Localization result.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMatch {
    pub node_id: NodeId,
    pub node_name: String,
    /// Reported confidence in `[0, 1]`. Includes the judge's opinion when a
    /// judge is configured.
    pub similarity: f32,
    pub map_id: MapId,
    /// Direction whose frame produced the match (directional protocol only).
    pub direction: Option<CardinalDirection>,
    /// Pure embedding similarity of the winning node.
    pub embedding_similarity: f32,
    pub judge_confidence: Option<f32>,
}

/// Localizes against one map's [`WaypointIndex`].
pub struct PositionLocalizer {
    index: WaypointIndex,
    embedder: Arc<dyn Embedder>,
    judge: Option<Arc<dyn VerificationJudge>>,
    config: LocalizationConfig,
}

impl PositionLocalizer {
    pub fn new(index: WaypointIndex, embedder: Arc<dyn Embedder>, config: LocalizationConfig) -> Self {
        Self {
            index,
            embedder,
            judge: None,
            config,
        }
    }

    /// Re-check scan winners with a verification judge.
    pub fn with_judge(mut self, judge: Arc<dyn VerificationJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn index(&self) -> &WaypointIndex {
        &self.index
    }

    /// Directional protocol. `frames` are in N, E, S, W order.
    ///
    /// A frame that fails to embed is skipped; if every frame fails the last
    /// error is returned.
    pub fn localize_directional(&self, frames: &[Frame; 4]) -> Result<Option<LocationMatch>> {
        let mut best: Option<(CardinalDirection, IndexHit)> = None;
        let mut last_error = None;
        let mut embedded = 0usize;

        for (direction, frame) in CardinalDirection::ALL.into_iter().zip(frames.iter()) {
            let embedding = match self.embedder.embed(frame) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping {} frame: {}", direction.as_str(), e);
                    last_error = Some(e);
                    continue;
                }
            };
            embedded += 1;

            let Some(hit) = self.index.best_match(&embedding) else {
                continue;
            };
            debug!(
                "{}: best node {} at {:.3} (seq {})",
                direction.as_str(),
                hit.node_id,
                hit.similarity,
                hit.sequence
            );
            // Strictly better only, so earlier directions keep ties
            if best.is_none_or(|(_, b)| hit.beats(&b)) {
                best = Some((direction, hit));
            }
        }

        if embedded == 0 {
            return Err(last_error.unwrap_or_else(|| {
                MargaError::SensorUnavailable("no directional frames".into())
            }));
        }

        let Some((direction, hit)) = best else {
            return Ok(None);
        };
        if hit.similarity < self.config.similarity_threshold {
            info!(
                "No match: best {:.3} below threshold {:.2}",
                hit.similarity, self.config.similarity_threshold
            );
            return Ok(None);
        }

        let location = self.location(hit.node_id, hit.similarity, hit.similarity, None, Some(direction));
        info!(
            "Localized at '{}' ({:.3}) from {} frame",
            location.node_name,
            location.similarity,
            direction.as_str()
        );
        Ok(Some(location))
    }

    /// Scanning protocol over the live camera.
    ///
    /// Samples up to `scan_samples` frames spaced `scan_interval_ms` apart.
    /// Busy or failed captures are skipped; a scan that embeds nothing fails
    /// with `SensorUnavailable`.
    pub fn localize_scan(
        &self,
        camera: &CameraAccessCoordinator,
        capture_timeout: Duration,
    ) -> Result<Option<LocationMatch>> {
        let interval = Duration::from_millis(self.config.scan_interval_ms);
        let mut frames = Vec::with_capacity(self.config.scan_samples);
        for sample in 0..self.config.scan_samples {
            if sample > 0 {
                thread::sleep(interval);
            }
            match camera.capture_with_timeout(CapturePurpose::Localization, capture_timeout) {
                Ok(frame) => frames.push(frame),
                Err(CaptureError::Busy { holder }) => {
                    debug!("Scan sample {} skipped: camera busy with {}", sample, holder);
                }
                Err(e) => warn!("Scan sample {} skipped: {}", sample, e),
            }
        }
        self.localize_frames(&frames)
    }

    /// Aggregate already-captured frames; the core of the scanning protocol.
    pub fn localize_frames(&self, frames: &[Frame]) -> Result<Option<LocationMatch>> {
        let mut per_node: BTreeMap<NodeId, NodeTally> = BTreeMap::new();
        let mut embedded = 0usize;

        for (i, frame) in frames.iter().enumerate() {
            let embedding: Embedding = match self.embedder.embed(frame) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Scan frame {} not embedded: {}", frame.sequence, e);
                    continue;
                }
            };
            embedded += 1;
            for (node, hit) in self.index.node_scores(&embedding) {
                let tally = per_node.entry(node).or_insert_with(|| NodeTally::new(hit, i));
                tally.push(hit, i);
            }
        }

        if embedded == 0 {
            return Err(MargaError::SensorUnavailable(
                "no scan frames could be captured and embedded".into(),
            ));
        }

        let mut winner: Option<(NodeId, f32, &NodeTally)> = None;
        for (node, tally) in &per_node {
            let score = self.config.aggregation.aggregate(&tally.scores);
            let better = match winner {
                None => true,
                // Full ties go to the lower node id, so equal inputs always
                // localize to the same node
                Some((best_node, best_score, best)) => {
                    score > best_score
                        || (score == best_score
                            && (tally.best.sequence, *node) < (best.best.sequence, best_node))
                }
            };
            if better {
                winner = Some((*node, score, tally));
            }
        }
        let Some((node_id, embedding_score, tally)) = winner else {
            return Ok(None);
        };

        debug!(
            "Scan winner node {} at {:.3} over {} frames ({:?})",
            node_id, embedding_score, embedded, self.config.aggregation
        );
        if embedding_score < self.config.similarity_threshold {
            info!(
                "No match: aggregated {:.3} below threshold {:.2}",
                embedding_score, self.config.similarity_threshold
            );
            return Ok(None);
        }

        let best_frame = &frames[tally.best_frame];
        let judge_confidence = self.verify(best_frame, node_id);
        let similarity = match judge_confidence {
            Some(judged) => {
                let w = self.config.judge_weight;
                (1.0 - w) * embedding_score + w * judged
            }
            None => embedding_score,
        };

        let location = self.location(node_id, similarity, embedding_score, judge_confidence, None);
        info!(
            "Localized at '{}' ({:.3}, embedding {:.3}, judge {:?})",
            location.node_name, location.similarity, embedding_score, judge_confidence
        );
        Ok(Some(location))
    }

    /// Ask the judge about `node` on `frame`. Judge failures fall back to the
    /// embedding score alone.
    fn verify(&self, frame: &Frame, node: NodeId) -> Option<f32> {
        let judge = self.judge.as_ref()?;
        let label = self.node_label(node);
        match judge.judge(frame, &label) {
            Ok(verdict) => {
                debug!("Judge on '{}': {:.2} ({})", label, verdict.confidence, verdict.reasoning);
                Some(verdict.confidence.clamp(0.0, 1.0))
            }
            Err(e) => {
                warn!("Verification judge failed for '{}': {}", label, e);
                None
            }
        }
    }

    fn node_label(&self, node: NodeId) -> String {
        self.index
            .node_name(node)
            .map(str::to_string)
            .unwrap_or_else(|| format!("node {}", node))
    }

    fn location(
        &self,
        node_id: NodeId,
        similarity: f32,
        embedding_similarity: f32,
        judge_confidence: Option<f32>,
        direction: Option<CardinalDirection>,
    ) -> LocationMatch {
        LocationMatch {
            node_id,
            node_name: self.node_label(node_id),
            similarity: similarity.clamp(0.0, 1.0),
            map_id: self.index.map_id(),
            direction,
            embedding_similarity,
            judge_confidence,
        }
    }
}

/// Per-node scores collected during a scan.
struct NodeTally {
    scores: Vec<f32>,
    best: IndexHit,
    best_frame: usize,
}

impl NodeTally {
    fn new(hit: IndexHit, frame: usize) -> Self {
        Self {
            scores: Vec::new(),
            best: hit,
            best_frame: frame,
        }
    }

    fn push(&mut self, hit: IndexHit, frame: usize) {
        self.scores.push(hit.similarity);
        if hit.beats(&self.best) {
            self.best = hit;
            self.best_frame = frame;
        }
    }
}
