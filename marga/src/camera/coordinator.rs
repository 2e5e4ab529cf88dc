//! Exclusive camera access.
//!
//! [`CameraAccessCoordinator`] is the single gatekeeper for the physical
//! camera. At most one capture is outstanding system-wide; a request that
//! arrives while the camera is busy is rejected immediately instead of
//! queued, so periodic samplers skip a tick rather than pile up.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::Frame;
use crate::error::{MargaError, Result};
use crate::utils::now_ms;

/// Device camera collaborator.
pub trait FrameSource: Send + Sync {
    /// Take one picture and return the encoded image bytes.
    fn capture(&self) -> Result<Vec<u8>>;
}

/// Who asked for a frame. Used for logging and busy diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePurpose {
    /// Periodic sample while navigating.
    NavigationSample,
    /// User-triggered capture during recovery.
    ManualRecovery,
    /// Frozen frame for a recording checkpoint.
    Checkpoint,
    /// Periodic sample while recording a walk.
    RecordingSample,
    /// Position localization (directional or scanning).
    Localization,
}

impl fmt::Display for CapturePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapturePurpose::NavigationSample => "navigation sample",
            CapturePurpose::ManualRecovery => "manual recovery",
            CapturePurpose::Checkpoint => "checkpoint",
            CapturePurpose::RecordingSample => "recording sample",
            CapturePurpose::Localization => "localization",
        };
        f.write_str(s)
    }
}

/// Capture failures reported at the coordinator boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("camera busy with {holder}")]
    Busy { holder: CapturePurpose },

    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("capture failed: {0}")]
    Device(String),
}

impl From<CaptureError> for MargaError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Busy { .. } => MargaError::CameraBusy,
            CaptureError::Timeout(d) => MargaError::CaptureTimeout(d),
            CaptureError::Unavailable(m) => MargaError::SensorUnavailable(m),
            CaptureError::Device(m) => MargaError::Capture(m),
        }
    }
}

/// Capture counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub completed: u64,
    pub rejected_busy: u64,
    pub failed: u64,
}

struct Inner {
    source: Arc<dyn FrameSource>,
    busy: AtomicBool,
    holder: Mutex<Option<CapturePurpose>>,
    next_sequence: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl Inner {
    fn take_frame(&self, purpose: CapturePurpose) -> std::result::Result<Frame, CaptureError> {
        match self.source.capture() {
            Ok(bytes) => {
                let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
                self.completed.fetch_add(1, Ordering::Relaxed);
                debug!("Captured frame {} for {} ({} bytes)", sequence, purpose, bytes.len());
                Ok(Frame::new(bytes, sequence, now_ms()))
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Capture for {} failed: {}", purpose, e);
                Err(match e {
                    MargaError::SensorUnavailable(m) => CaptureError::Unavailable(m),
                    other => CaptureError::Device(other.to_string()),
                })
            }
        }
    }
}

/// Proof of exclusive camera access. Releases the camera when dropped.
pub struct CameraLease {
    inner: Arc<Inner>,
    purpose: CapturePurpose,
}

impl CameraLease {
    pub fn purpose(&self) -> CapturePurpose {
        self.purpose
    }

    /// Take a frame while holding the lease.
    pub fn capture(&self) -> std::result::Result<Frame, CaptureError> {
        self.inner.take_frame(self.purpose)
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        let mut holder = self.inner.holder.lock();
        *holder = None;
        self.inner.busy.store(false, Ordering::Release);
    }
}

/// Serializes every capture request in the process.
///
/// Cloning is cheap and all clones share the same lock.
#[derive(Clone)]
pub struct CameraAccessCoordinator {
    inner: Arc<Inner>,
}

impl CameraAccessCoordinator {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                busy: AtomicBool::new(false),
                holder: Mutex::new(None),
                next_sequence: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Try to take exclusive access without waiting.
    pub fn try_acquire(
        &self,
        purpose: CapturePurpose,
    ) -> std::result::Result<CameraLease, CaptureError> {
        // Holder and busy flag change together under the holder lock
        let mut holder = self.inner.holder.lock();
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.inner.rejected.fetch_add(1, Ordering::Relaxed);
            let holder = (*holder).unwrap_or(purpose);
            debug!("Rejected {} capture: camera busy with {}", purpose, holder);
            return Err(CaptureError::Busy { holder });
        }
        *holder = Some(purpose);
        drop(holder);
        Ok(CameraLease {
            inner: Arc::clone(&self.inner),
            purpose,
        })
    }

    /// Acquire, capture and release on the calling thread.
    pub fn capture(&self, purpose: CapturePurpose) -> std::result::Result<Frame, CaptureError> {
        let lease = self.try_acquire(purpose)?;
        lease.capture()
    }

    /// Capture on a worker thread and give up waiting after `timeout`.
    ///
    /// On timeout the worker keeps the lease until the device returns, so the
    /// camera stays busy and no second capture can overlap the stuck one.
    pub fn capture_with_timeout(
        &self,
        purpose: CapturePurpose,
        timeout: Duration,
    ) -> std::result::Result<Frame, CaptureError> {
        let lease = self.try_acquire(purpose)?;
        let (tx, rx) = bounded(1);

        thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || {
                let result = lease.capture();
                drop(lease);
                // Receiver may have timed out already
                let _ = tx.send(result);
            })
            .map_err(|e| CaptureError::Device(format!("failed to spawn capture thread: {}", e)))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!("{} capture timed out after {:?}", purpose, timeout);
                Err(CaptureError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(CaptureError::Device("capture thread exited without a result".into()))
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            completed: self.inner.completed.load(Ordering::Relaxed),
            rejected_busy: self.inner.rejected.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }
}
