//! Periodic multimodal check feeding the fourth signal source.
//!
//! On a fixed period the scheduler captures whatever screen/camera
//! artifacts are available, ships them to the external classification
//! service with the session goal, and forwards the verdict as a candidate
//! only when it changes the drifted/focused judgement, so a steady verdict
//! produces no repeat traffic downstream. A failed tick is logged and
//! skipped; it never crashes the loop and never by itself sets or clears
//! drift state.

use crate::signal::{CandidateTx, DriftCandidate, SignalKind};
use chrono::Utc;
use helmsman_services::{
    CaptureDevice, CaptureKind, ClassificationRequest, DriftCause, MultimodalClassifier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct HeartbeatScheduler {
    period: Duration,
    capture: Arc<dyn CaptureDevice>,
    classifier: Arc<dyn MultimodalClassifier>,
    goal_text: String,
    related_contexts: Vec<String>,
    tx: CandidateTx,
    /// Whether the previous tick judged the user drifted, so we only emit
    /// on verdict changes instead of every period.
    drifted: bool,
}

impl HeartbeatScheduler {
    #[must_use]
    pub fn new(
        period: Duration,
        capture: Arc<dyn CaptureDevice>,
        classifier: Arc<dyn MultimodalClassifier>,
        goal_text: String,
        related_contexts: Vec<String>,
        tx: CandidateTx,
    ) -> Self {
        Self {
            period,
            capture,
            classifier,
            goal_text,
            related_contexts,
            tx,
            drifted: false,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of tokio's interval fires immediately; skip it so
        // the first classification happens a full period into the session.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        log::warn!("heartbeat tick skipped: {e}");
                    }
                }
            }
        }
        log::debug!("heartbeat scheduler stopped");
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        let request = ClassificationRequest {
            screenshot: self.capture_one(CaptureKind::Screen).await,
            camera_frame: self.capture_one(CaptureKind::Camera).await,
            goal_text: self.goal_text.clone(),
            related_contexts: self.related_contexts.clone(),
        };

        if !request.has_artifacts() {
            log::debug!("heartbeat: no capturable artifacts, skipping tick");
            return Ok(());
        }

        let verdict = self.classifier.classify(&request).await?;
        log::debug!(
            "heartbeat verdict: content_relevant={} camera={:?} confidence={:.2}",
            verdict.content_relevant,
            verdict.camera,
            verdict.confidence_level
        );

        let now_drifted = verdict.indicates_drift();
        if now_drifted && !self.drifted {
            self.drifted = true;
            let candidate = DriftCandidate::drift(
                SignalKind::Multimodal,
                DriftCause::Multimodal,
                Utc::now(),
                verdict.confidence_level,
            );
            self.tx.send(candidate).await?;
        } else if !now_drifted && self.drifted {
            self.drifted = false;
            self.tx
                .send(DriftCandidate::restored(SignalKind::Multimodal, None))
                .await?;
        }
        Ok(())
    }

    /// Acquire, capture one frame, and release; every path releases the
    /// handle. Acquisition failure disables that kind for this tick only.
    async fn capture_one(&self, kind: CaptureKind) -> Option<Vec<u8>> {
        let handle = match self.capture.acquire(kind).await {
            Ok(handle) => handle,
            Err(e) => {
                log::debug!("heartbeat: {kind:?} unavailable: {e}");
                return None;
            }
        };

        let frame = match self.capture.capture_frame(&handle).await {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("heartbeat: {kind:?} frame capture failed: {e}");
                None
            }
        };
        self.capture.release(handle).await;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::CandidateKind;
    use async_trait::async_trait;
    use helmsman_services::{
        CaptureError, CaptureHandle, ClassificationVerdict, ServiceError,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::advance;

    const PERIOD: Duration = Duration::from_secs(60);

    /// Screen-only capture backend emitting fixed frames.
    struct ScreenOnlyCapture {
        releases: AtomicUsize,
    }

    impl ScreenOnlyCapture {
        fn new() -> Self {
            Self {
                releases: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CaptureDevice for ScreenOnlyCapture {
        async fn acquire(&self, kind: CaptureKind) -> Result<CaptureHandle, CaptureError> {
            match kind {
                CaptureKind::Screen => Ok(CaptureHandle::new(kind)),
                _ => Err(CaptureError::DeviceUnavailable("no such device".into())),
            }
        }

        async fn capture_frame(
            &self,
            _handle: &CaptureHandle,
        ) -> Result<Option<Vec<u8>>, CaptureError> {
            Ok(Some(vec![1, 2, 3]))
        }

        async fn release(&self, _handle: CaptureHandle) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Classifier returning a fixed relevance flag, or an error.
    struct FixedClassifier {
        relevant: AtomicBool,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(relevant: bool) -> Self {
            Self {
                relevant: AtomicBool::new(relevant),
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MultimodalClassifier for FixedClassifier {
        async fn classify(
            &self,
            request: &ClassificationRequest,
        ) -> Result<ClassificationVerdict, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.has_artifacts());
            if self.fail.load(Ordering::SeqCst) {
                return Err(ServiceError::Transient("upstream timeout".into()));
            }
            Ok(ClassificationVerdict {
                content_relevant: self.relevant.load(Ordering::SeqCst),
                camera: None,
                confidence_level: 0.8,
            })
        }
    }

    fn spawn_heartbeat(
        capture: Arc<ScreenOnlyCapture>,
        classifier: Arc<FixedClassifier>,
    ) -> (mpsc::Receiver<DriftCandidate>, CancellationToken) {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let heartbeat = HeartbeatScheduler::new(
            PERIOD,
            capture,
            classifier,
            "plan a trip to Lisbon".to_string(),
            vec!["booking".to_string()],
            tx,
        );
        tokio::spawn(heartbeat.run(cancel.clone()));
        (rx, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_irrelevant_content_without_camera_raises_multimodal() {
        let capture = Arc::new(ScreenOnlyCapture::new());
        let classifier = Arc::new(FixedClassifier::new(false));
        let (mut candidates, _cancel) = spawn_heartbeat(capture, classifier);

        advance(PERIOD).await;
        let raise = candidates.recv().await.unwrap();
        assert_eq!(raise.source, SignalKind::Multimodal);
        assert!(matches!(
            raise.kind,
            CandidateKind::Drift { cause: DriftCause::Multimodal, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_verdict_emits_once() {
        let capture = Arc::new(ScreenOnlyCapture::new());
        let classifier = Arc::new(FixedClassifier::new(false));
        let (mut candidates, _cancel) = spawn_heartbeat(capture, classifier.clone());

        advance(PERIOD).await;
        let _raise = candidates.recv().await.unwrap();
        // Yield after each period so the scheduler processes every tick.
        advance(PERIOD).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        advance(PERIOD).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Classification kept running but no duplicate candidates went out.
        assert!(classifier.calls.load(Ordering::SeqCst) >= 3);
        assert!(candidates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relevant_verdict_clears_previous_drift() {
        let capture = Arc::new(ScreenOnlyCapture::new());
        let classifier = Arc::new(FixedClassifier::new(false));
        let (mut candidates, _cancel) = spawn_heartbeat(capture, classifier.clone());

        advance(PERIOD).await;
        let _raise = candidates.recv().await.unwrap();

        classifier.relevant.store(true, Ordering::SeqCst);
        advance(PERIOD).await;
        let restore = candidates.recv().await.unwrap();
        assert!(matches!(restore.kind, CandidateKind::FocusRestored));
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifier_failure_skips_tick_and_recovers() {
        let capture = Arc::new(ScreenOnlyCapture::new());
        let classifier = Arc::new(FixedClassifier::new(false));
        classifier.fail.store(true, Ordering::SeqCst);
        let (mut candidates, _cancel) = spawn_heartbeat(capture.clone(), classifier.clone());
        // Let the spawned scheduler start its interval at t=0 before time
        // moves; `advance` bumps the clock before yielding to new tasks.
        tokio::task::yield_now().await;

        advance(PERIOD).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        advance(PERIOD).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(candidates.try_recv().is_err());

        // The loop survived the failures and the next good tick works.
        classifier.fail.store(false, Ordering::SeqCst);
        advance(PERIOD).await;
        let raise = candidates.recv().await.unwrap();
        assert!(matches!(raise.kind, CandidateKind::Drift { .. }));

        // Handles were released on every tick, including failing ones.
        assert!(capture.releases.load(Ordering::SeqCst) >= 3);
    }
}
