//! Teach-by-walking recording session.
//!
//! State machine:
//! ```text
//!  Recording ──mark_checkpoint──► Checkpoint
//!      ▲                              │
//!      └──complete_segment / cancel_checkpoint
//!  Recording ──finish──► Review ──finalize──► Finalized
//!  any ──cancel──► Cancelled
//! ```
//!
//! Distance is pure dead reckoning from the pedometer (see [`StepTracker`]).
//! While frozen at a checkpoint, step readings are held back and the paused
//! interval is excluded on resume.

use tracing::{debug, info, warn};

use super::finalize::build_path;
use super::landmark::{CandidateLandmark, Landmark};
use super::suggestions::{SuggestedCheckpoint, filter_suggestions};
use crate::camera::PeriodicCapture;
use crate::config::RecordingConfig;
use crate::core::{
    BoundingBox, Detection, Embedding, Frame, MapId, NodeId, PathDraft, PathId, TurnDirection,
    normalize_heading,
};
use crate::error::{MargaError, Result};
use crate::sensors::{StepCounter, StepTracker};
use crate::store::{PathStore, WalkingSessionOutcome, WalkingSessionRecord};
use crate::utils::{now_ms, round_cm};

/// Recording lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Recording,
    Checkpoint,
    Review,
    Finalized,
    Cancelled,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Recording => "recording",
            RecordingState::Checkpoint => "checkpoint",
            RecordingState::Review => "review",
            RecordingState::Finalized => "finalized",
            RecordingState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordingState::Finalized | RecordingState::Cancelled)
    }
}

/// What is being recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingTarget {
    pub map_id: MapId,
    pub start_node: NodeId,
    pub end_node: NodeId,
    /// Path name; defaults to "{start} to {end}" in the host.
    pub name: String,
}

/// One embedded sample taken while walking.
#[derive(Debug, Clone)]
pub struct WalkSample {
    pub embedding: Embedding,
    pub heading: f32,
    pub step_count: u64,
    pub distance_m: f32,
    pub timestamp_ms: u64,
    /// Segment this sample belongs to (number of segments completed when it
    /// was taken).
    pub segment: usize,
}

/// Closing capture of a segment, taken when the checkpoint was marked.
#[derive(Debug, Clone)]
pub struct CheckpointCapture {
    pub embedding: Embedding,
    pub heading: f32,
    pub timestamp_ms: u64,
}

/// One completed sub-leg between checkpoints.
#[derive(Debug, Clone)]
pub struct Segment {
    pub start_steps: u64,
    pub end_steps: u64,
    /// Cumulative distance at the checkpoint minus all earlier segments.
    pub distance_m: f32,
    pub landmark: Landmark,
    pub turn: TurnDirection,
    pub checkpoint: CheckpointCapture,
}

/// Session state held while paused at a checkpoint.
struct FrozenCheckpoint {
    frame: Frame,
    detections: Vec<Detection>,
    capture: CheckpointCapture,
    step_count: u64,
    distance_m: f32,
}

/// One in-progress teach-by-walk.
pub struct PathRecordingSession {
    target: RecordingTarget,
    config: RecordingConfig,
    state: RecordingState,
    tracker: StepTracker,
    samples: Vec<WalkSample>,
    candidates: Vec<CandidateLandmark>,
    segments: Vec<Segment>,
    frozen: Option<FrozenCheckpoint>,
    sampler: Option<PeriodicCapture>,
    started_at_ms: u64,
}

impl PathRecordingSession {
    /// Start recording; reads the step baseline from `steps`.
    pub fn start(
        steps: &dyn StepCounter,
        target: RecordingTarget,
        config: RecordingConfig,
    ) -> Result<Self> {
        let baseline = steps.current_steps().map_err(|e| match e {
            MargaError::SensorUnavailable(m) => MargaError::SensorUnavailable(m),
            other => MargaError::SensorUnavailable(format!("step counter: {}", other)),
        })?;
        info!(
            "Recording '{}' started (step baseline {}, stride {:.2} m)",
            target.name, baseline, config.stride_meters
        );
        Ok(Self {
            target,
            tracker: StepTracker::new(config.stride_meters, baseline),
            config,
            state: RecordingState::Recording,
            samples: Vec::new(),
            candidates: Vec::new(),
            segments: Vec::new(),
            frozen: None,
            sampler: None,
            started_at_ms: now_ms(),
        })
    }

    /// Hand over the periodic sampler feeding this session so it is stopped
    /// together with it.
    pub fn attach_sampler(&mut self, sampler: PeriodicCapture) {
        if let Some(mut old) = self.sampler.replace(sampler) {
            old.stop();
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn target(&self) -> &RecordingTarget {
        &self.target
    }

    pub fn relative_steps(&self) -> u64 {
        self.tracker.relative_steps()
    }

    /// Distance walked so far in meters.
    pub fn distance_m(&self) -> f32 {
        self.tracker.distance_m()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn samples(&self) -> &[WalkSample] {
        &self.samples
    }

    pub fn frozen_frame(&self) -> Option<&Frame> {
        self.frozen.as_ref().map(|f| &f.frame)
    }

    pub fn frozen_detections(&self) -> &[Detection] {
        self.frozen
            .as_ref()
            .map(|f| f.detections.as_slice())
            .unwrap_or_default()
    }

    /// Raw pedometer reading. Ignored once the walk is over.
    pub fn on_step_count(&mut self, raw: u64) {
        match self.state {
            RecordingState::Recording | RecordingState::Checkpoint => {
                self.tracker.update(raw);
            }
            _ => debug!("Step reading {} ignored in {}", raw, self.state.as_str()),
        }
    }

    /// Add an embedded walking sample.
    ///
    /// Samples arriving while frozen at a checkpoint are dropped.
    pub fn record_sample(&mut self, embedding: Embedding, heading: f32) -> Result<()> {
        match self.state {
            RecordingState::Recording => {}
            RecordingState::Checkpoint => {
                debug!("Sample dropped while frozen at checkpoint");
                return Ok(());
            }
            other => return Err(MargaError::invalid_state("record_sample", other.as_str())),
        }
        self.samples.push(WalkSample {
            embedding,
            heading: normalize_heading(heading),
            step_count: self.tracker.relative_steps(),
            distance_m: self.tracker.distance_m(),
            timestamp_ms: now_ms(),
            segment: self.segments.len(),
        });
        Ok(())
    }

    /// Remember detector output as suggestion candidates.
    pub fn observe_detections(&mut self, detections: &[Detection]) -> Result<()> {
        self.require(RecordingState::Recording, "observe_detections")?;
        let (step_count, distance_m) = (self.tracker.relative_steps(), self.tracker.distance_m());
        self.candidates
            .extend(detections.iter().cloned().map(|detection| CandidateLandmark {
                detection,
                step_count,
                distance_m,
            }));
        Ok(())
    }

    /// Freeze at a checkpoint with the captured frame, its detections, and
    /// the frame's embedding and heading.
    pub fn mark_checkpoint(
        &mut self,
        frame: Frame,
        detections: Vec<Detection>,
        embedding: Embedding,
        heading: f32,
    ) -> Result<()> {
        self.require(RecordingState::Recording, "mark_checkpoint")?;
        self.tracker.pause();
        info!(
            "Checkpoint at {} steps ({:.2} m), {} detections",
            self.tracker.relative_steps(),
            self.tracker.distance_m(),
            detections.len()
        );
        self.frozen = Some(FrozenCheckpoint {
            frame,
            detections,
            capture: CheckpointCapture {
                embedding,
                heading: normalize_heading(heading),
                timestamp_ms: now_ms(),
            },
            step_count: self.tracker.relative_steps(),
            distance_m: self.tracker.distance_m(),
        });
        self.state = RecordingState::Checkpoint;
        Ok(())
    }

    /// Landmark from the frozen frame's detection at `index`.
    pub fn select_landmark(&self, index: usize) -> Result<Landmark> {
        let frozen = self.frozen_checkpoint("select_landmark")?;
        let detection = frozen.detections.get(index).ok_or_else(|| {
            MargaError::NotFound(format!(
                "detection {} (frame has {})",
                index,
                frozen.detections.len()
            ))
        })?;
        Ok(Landmark::detected(
            detection,
            Some(frozen.frame.clone()),
            frozen.step_count,
            frozen.distance_m,
        ))
    }

    /// Landmark from a region the operator drew on the frozen frame.
    pub fn draw_custom_landmark(&self, label: &str, bbox: BoundingBox) -> Result<Landmark> {
        let frozen = self.frozen_checkpoint("draw_custom_landmark")?;
        Landmark::custom(
            label,
            bbox,
            Some(frozen.frame.clone()),
            frozen.step_count,
            frozen.distance_m,
        )
    }

    /// Close the current segment and resume walking.
    pub fn complete_segment(&mut self, landmark: Landmark, turn: TurnDirection) -> Result<&Segment> {
        self.require(RecordingState::Checkpoint, "complete_segment")?;
        let Some(frozen) = self.frozen.take() else {
            return Err(MargaError::invalid_state("complete_segment", "checkpoint without frame"));
        };

        let previous: f32 = self.segments.iter().map(|s| s.distance_m).sum();
        let distance_m = (frozen.distance_m - previous).max(0.0);
        let start_steps = self.segments.last().map_or(0, |s| s.end_steps);

        info!(
            "Segment {} complete: '{}', {} -> {} steps, {:.2} m, turn {}",
            self.segments.len() + 1,
            landmark.label,
            start_steps,
            frozen.step_count,
            distance_m,
            turn.as_str()
        );
        self.segments.push(Segment {
            start_steps,
            end_steps: frozen.step_count,
            distance_m,
            landmark,
            turn,
            checkpoint: frozen.capture,
        });
        self.tracker.resume();
        self.state = RecordingState::Recording;

        let index = self.segments.len() - 1;
        Ok(&self.segments[index])
    }

    /// Leave the checkpoint without adding a segment.
    pub fn cancel_checkpoint(&mut self) -> Result<()> {
        self.require(RecordingState::Checkpoint, "cancel_checkpoint")?;
        self.frozen = None;
        self.tracker.resume();
        self.state = RecordingState::Recording;
        debug!("Checkpoint cancelled");
        Ok(())
    }

    /// Stop walking and move to review.
    ///
    /// Fails with `EmptySession` (and keeps recording) when no segment has
    /// been completed. Calling it again in review is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            RecordingState::Review => return Ok(()),
            RecordingState::Recording => {}
            other => return Err(MargaError::invalid_state("finish", other.as_str())),
        }
        if self.segments.is_empty() {
            return Err(MargaError::EmptySession);
        }
        self.stop_sampler();
        self.tracker.pause();
        self.state = RecordingState::Review;
        info!(
            "Recording '{}' finished: {} segments, {} steps",
            self.target.name,
            self.segments.len(),
            self.tracker.relative_steps()
        );
        Ok(())
    }

    /// Drop everything. Safe in any state, any number of times.
    pub fn cancel(&mut self) {
        if self.state == RecordingState::Cancelled {
            return;
        }
        self.stop_sampler();
        self.frozen = None;
        self.samples.clear();
        self.candidates.clear();
        self.segments.clear();
        self.tracker.pause();
        info!("Recording '{}' cancelled in {}", self.target.name, self.state.as_str());
        self.state = RecordingState::Cancelled;
    }

    /// Confident, de-duplicated landmarks seen while walking.
    pub fn suggestions(&self) -> Vec<SuggestedCheckpoint> {
        filter_suggestions(
            &self.candidates,
            self.config.suggestion_min_confidence,
            self.config.suggestion_min_spacing_m,
        )
    }

    /// Path that `finalize` would persist.
    pub fn build_path(&self, selected: &[SuggestedCheckpoint]) -> Result<PathDraft> {
        self.require(RecordingState::Review, "build_path")?;
        build_path(
            &self.target,
            &self.samples,
            &self.segments,
            selected,
            &self.config,
        )
    }

    /// Persist the reviewed walk as a path.
    ///
    /// On a store error the session stays in review so the caller can retry.
    pub fn finalize(
        &mut self,
        store: &dyn PathStore,
        selected: &[SuggestedCheckpoint],
    ) -> Result<PathId> {
        let draft = self.build_path(selected)?;
        let (steps, distance_m) = (draft.estimated_steps, draft.estimated_distance_m);
        let path_id = store.insert_path(draft)?;

        let record = WalkingSessionRecord {
            map_id: self.target.map_id,
            start_node: self.target.start_node,
            end_node: self.target.end_node,
            path_id: Some(path_id),
            steps: u64::from(steps),
            distance_m,
            segments: self.segments.len(),
            started_at_ms: self.started_at_ms,
            ended_at_ms: now_ms(),
            outcome: WalkingSessionOutcome::Finalized,
        };
        if let Err(e) = store.save_walking_session(record) {
            // The path itself is stored; the summary row is best effort
            warn!("Failed to log walking session for path {}: {}", path_id, e);
        }

        self.state = RecordingState::Finalized;
        info!("Recording '{}' finalized as path {}", self.target.name, path_id);
        Ok(path_id)
    }

    fn require(&self, expected: RecordingState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(MargaError::invalid_state(operation, self.state.as_str()))
        }
    }

    fn frozen_checkpoint(&self, operation: &'static str) -> Result<&FrozenCheckpoint> {
        self.require(RecordingState::Checkpoint, operation)?;
        self.frozen
            .as_ref()
            .ok_or_else(|| MargaError::invalid_state(operation, "checkpoint without frame"))
    }

    fn stop_sampler(&mut self) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop();
        }
    }
}

impl Drop for PathRecordingSession {
    fn drop(&mut self) {
        self.stop_sampler();
    }
}

/// Estimated totals for a list of segments: (steps, distance in meters).
pub(crate) fn segment_totals(segments: &[Segment]) -> (u64, f32) {
    let steps = segments.last().map_or(0, |s| s.end_steps);
    let distance: f32 = segments.iter().map(|s| s.distance_m).sum();
    (steps, round_cm(distance))
}
