use crate::signal::{CandidateTx, DriftCandidate, SignalKind};
use chrono::Utc;
use helmsman_services::DriftCause;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Foreground/background transition of the work surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityEvent {
    Hidden,
    Visible,
}

/// Watches visibility transitions with a grace period so quick glances at
/// another window never count as drift.
///
/// On `Hidden` a grace timer is armed; only if it fires while still hidden
/// does a `tab_switch` drift go out, back-dated to the moment of hiding.
/// The matching restore carries the full measured hidden duration.
pub struct VisibilityWatcher {
    grace: Duration,
    tx: CandidateTx,
}

impl VisibilityWatcher {
    #[must_use]
    pub fn new(grace: Duration, tx: CandidateTx) -> Self {
        Self { grace, tx }
    }

    pub async fn run(
        self,
        mut events: tokio::sync::mpsc::Receiver<VisibilityEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    None => break,
                    Some(VisibilityEvent::Hidden) => {
                        if !self.hidden_period(&mut events, &cancel).await {
                            break;
                        }
                    }
                    // Visible while already visible: nothing to do.
                    Some(VisibilityEvent::Visible) => {}
                },
            }
        }
        log::debug!("visibility watcher stopped");
    }

    /// Runs from a `Hidden` transition until the surface is visible again.
    /// Returns false when the watcher should shut down.
    async fn hidden_period(
        &self,
        events: &mut tokio::sync::mpsc::Receiver<VisibilityEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        let hidden_at = Utc::now();
        let hidden_mono = Instant::now();
        let grace = sleep(self.grace);
        tokio::pin!(grace);
        let mut grace_fired = false;

        loop {
            tokio::select! {
                () = cancel.cancelled() => return false,
                () = &mut grace, if !grace_fired => {
                    grace_fired = true;
                    let candidate = DriftCandidate::drift(
                        SignalKind::Visibility,
                        DriftCause::TabSwitch,
                        hidden_at,
                        1.0,
                    );
                    if self.tx.send(candidate).await.is_err() {
                        return false;
                    }
                }
                event = events.recv() => match event {
                    None => return false,
                    Some(VisibilityEvent::Visible) => {
                        if grace_fired {
                            let candidate = DriftCandidate::restored(
                                SignalKind::Visibility,
                                Some(hidden_mono.elapsed()),
                            );
                            if self.tx.send(candidate).await.is_err() {
                                return false;
                            }
                        }
                        return true;
                    }
                    // Duplicate hidden event: the period is already open.
                    Some(VisibilityEvent::Hidden) => {}
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::CandidateKind;
    use tokio::sync::mpsc;
    use tokio::time::advance;

    const GRACE: Duration = Duration::from_secs(5);

    fn spawn_watcher() -> (
        mpsc::Sender<VisibilityEvent>,
        mpsc::Receiver<DriftCandidate>,
        CancellationToken,
    ) {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (candidate_tx, candidate_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let watcher = VisibilityWatcher::new(GRACE, candidate_tx);
        tokio::spawn(watcher.run(event_rx, cancel.clone()));
        (event_tx, candidate_rx, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_glance_emits_nothing() {
        let (events, mut candidates, _cancel) = spawn_watcher();

        events.send(VisibilityEvent::Hidden).await.unwrap();
        advance(Duration::from_secs(3)).await;
        events.send(VisibilityEvent::Visible).await.unwrap();
        // Let the watcher drain the event before moving past the deadline.
        tokio::time::sleep(Duration::from_millis(1)).await;
        advance(Duration::from_secs(10)).await;

        assert!(candidates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_hide_emits_one_event_with_duration() {
        let (events, mut candidates, _cancel) = spawn_watcher();

        events.send(VisibilityEvent::Hidden).await.unwrap();
        // Let the watcher open the hidden period before time moves.
        tokio::time::sleep(Duration::from_millis(1)).await;
        advance(Duration::from_secs(7)).await;

        let raise = candidates.recv().await.unwrap();
        assert_eq!(raise.source, SignalKind::Visibility);
        assert!(matches!(
            raise.kind,
            CandidateKind::Drift { cause: DriftCause::TabSwitch, .. }
        ));

        events.send(VisibilityEvent::Visible).await.unwrap();
        let restore = candidates.recv().await.unwrap();
        assert!(matches!(restore.kind, CandidateKind::FocusRestored));
        let measured = restore.duration.unwrap();
        assert!(measured >= Duration::from_secs(7));
        assert!(measured < Duration::from_secs(8));

        // Exactly one raise/restore pair.
        advance(Duration::from_secs(30)).await;
        assert!(candidates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_hidden_does_not_restart_grace() {
        let (events, mut candidates, _cancel) = spawn_watcher();

        events.send(VisibilityEvent::Hidden).await.unwrap();
        advance(Duration::from_secs(4)).await;
        events.send(VisibilityEvent::Hidden).await.unwrap();
        advance(Duration::from_secs(1)).await;

        // Grace counts from the first hidden transition.
        let raise = candidates.recv().await.unwrap();
        assert!(matches!(raise.kind, CandidateKind::Drift { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_watcher() {
        let (events, mut candidates, cancel) = spawn_watcher();

        events.send(VisibilityEvent::Hidden).await.unwrap();
        advance(Duration::from_secs(1)).await;
        cancel.cancel();
        advance(Duration::from_secs(10)).await;

        assert!(candidates.recv().await.is_none());
    }
}
