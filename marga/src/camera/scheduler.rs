//! Periodic capture scheduling.
//!
//! [`PeriodicCapture`] runs a named ticker thread that asks the coordinator
//! for one frame per interval. Busy ticks are skipped and counted, never
//! queued. Frames are handed to a callback; returning `false` from the
//! callback ends the ticker (typically because the consumer hung up).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use tracing::{debug, info, warn};

use super::coordinator::{CameraAccessCoordinator, CaptureError, CapturePurpose};
use crate::core::Frame;
use crate::error::{MargaError, Result};

/// Handle to a running ticker thread.
pub struct PeriodicCapture {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    skipped: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
}

impl PeriodicCapture {
    /// Start capturing every `interval`.
    ///
    /// Each capture is bounded by `capture_timeout`; a timed-out capture keeps
    /// the camera busy, so following ticks are skipped until it returns.
    pub fn spawn<F>(
        camera: CameraAccessCoordinator,
        purpose: CapturePurpose,
        interval: Duration,
        capture_timeout: Duration,
        mut on_frame: F,
    ) -> Result<Self>
    where
        F: FnMut(Frame) -> bool + Send + 'static,
    {
        Self::spawn_gated(
            camera,
            purpose,
            interval,
            capture_timeout,
            || Some(()),
            move |(), frame| on_frame(frame),
        )
    }

    /// Like [`spawn`](Self::spawn), but `gate` is consulted before every tick.
    ///
    /// A tick whose gate returns `None` does not touch the camera. The token
    /// returned by the gate travels with the frame, so the consumer can tell
    /// which request the frame answers (e.g. a navigation epoch).
    pub fn spawn_gated<T, G, F>(
        camera: CameraAccessCoordinator,
        purpose: CapturePurpose,
        interval: Duration,
        capture_timeout: Duration,
        mut gate: G,
        mut on_frame: F,
    ) -> Result<Self>
    where
        T: Send + 'static,
        G: FnMut() -> Option<T> + Send + 'static,
        F: FnMut(T, Frame) -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let skipped = Arc::new(AtomicU64::new(0));
        let delivered = Arc::new(AtomicU64::new(0));
        let thread_skipped = Arc::clone(&skipped);
        let thread_delivered = Arc::clone(&delivered);

        let handle = thread::Builder::new()
            .name(format!("capture-{}", purpose).replace(' ', "-"))
            .spawn(move || {
                let ticker = tick(interval);
                info!("Periodic {} capture started ({:?} interval)", purpose, interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(token) = gate() else {
                                continue;
                            };
                            match camera.capture_with_timeout(purpose, capture_timeout) {
                                Ok(frame) => {
                                    thread_delivered.fetch_add(1, Ordering::Relaxed);
                                    if !on_frame(token, frame) {
                                        debug!("Frame consumer closed, ending {} ticker", purpose);
                                        break;
                                    }
                                }
                                Err(CaptureError::Busy { holder }) => {
                                    thread_skipped.fetch_add(1, Ordering::Relaxed);
                                    debug!("Skipped {} tick: camera busy with {}", purpose, holder);
                                }
                                Err(e) => {
                                    thread_skipped.fetch_add(1, Ordering::Relaxed);
                                    warn!("Skipped {} tick: {}", purpose, e);
                                }
                            }
                        }
                    }
                }
                info!("Periodic {} capture stopped", purpose);
            })
            .map_err(|e| MargaError::Capture(format!("failed to spawn capture ticker: {}", e)))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            skipped,
            delivered,
        })
    }

    /// Stop the ticker and wait for it to exit. Safe to call repeatedly.
    ///
    /// Waits at most for the in-flight capture's timeout.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Capture ticker panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ticks skipped because the camera was busy or failed.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Frames handed to the callback.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Drop for PeriodicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FrameSource;
    use std::time::Instant;

    struct StaticSource;

    impl FrameSource for StaticSource {
        fn capture(&self) -> Result<Vec<u8>> {
            Ok(vec![7])
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_delivers_frames_until_stopped() {
        let camera = CameraAccessCoordinator::new(Arc::new(StaticSource));
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut ticker = PeriodicCapture::spawn(
            camera,
            CapturePurpose::NavigationSample,
            Duration::from_millis(10),
            Duration::from_millis(200),
            move |frame| tx.send(frame).is_ok(),
        )
        .unwrap();

        assert!(wait_until(|| rx.len() >= 3));
        ticker.stop();
        ticker.stop();
        assert!(!ticker.is_running());

        let count = rx.len();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(rx.len(), count);
    }

    #[test]
    fn test_busy_ticks_are_skipped() {
        let camera = CameraAccessCoordinator::new(Arc::new(StaticSource));
        let lease = camera.try_acquire(CapturePurpose::ManualRecovery).unwrap();

        let mut ticker = PeriodicCapture::spawn(
            camera.clone(),
            CapturePurpose::NavigationSample,
            Duration::from_millis(10),
            Duration::from_millis(200),
            |_| true,
        )
        .unwrap();

        assert!(wait_until(|| ticker.skipped() >= 2));
        assert_eq!(ticker.delivered(), 0);

        drop(lease);
        assert!(wait_until(|| ticker.delivered() >= 1));
        ticker.stop();
    }

    #[test]
    fn test_consumer_hangup_ends_ticker() {
        let camera = CameraAccessCoordinator::new(Arc::new(StaticSource));
        let ticker = PeriodicCapture::spawn(
            camera,
            CapturePurpose::RecordingSample,
            Duration::from_millis(5),
            Duration::from_millis(200),
            |_| false,
        )
        .unwrap();

        assert!(wait_until(|| !ticker.is_running()));
    }

    #[test]
    fn test_closed_gate_leaves_camera_alone() {
        use std::sync::atomic::AtomicBool;

        let camera = CameraAccessCoordinator::new(Arc::new(StaticSource));
        let open = Arc::new(AtomicBool::new(false));
        let gate_open = Arc::clone(&open);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut ticker = PeriodicCapture::spawn_gated(
            camera.clone(),
            CapturePurpose::NavigationSample,
            Duration::from_millis(5),
            Duration::from_millis(200),
            move || gate_open.load(Ordering::SeqCst).then_some(42u64),
            move |token, _frame| tx.send(token).is_ok(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(camera.stats().completed, 0);

        open.store(true, Ordering::SeqCst);
        assert!(wait_until(|| !rx.is_empty()));
        assert_eq!(rx.recv().unwrap(), 42);
        ticker.stop();
    }
}
