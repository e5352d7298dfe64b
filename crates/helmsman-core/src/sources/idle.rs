use crate::signal::{CandidateTx, DriftCandidate, SignalKind};
use chrono::{DateTime, Utc};
use helmsman_services::DriftCause;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Watches for the absence of user input.
///
/// Every input ping re-arms the idle timer. When it fires, the emitted
/// drift is back-dated to the last activity timestamp so the reported
/// duration spans the entire idle period, not just the timer window. The
/// next ping after firing emits the matching restore.
pub struct IdleWatcher {
    threshold: Duration,
    tx: CandidateTx,
}

impl IdleWatcher {
    #[must_use]
    pub fn new(threshold: Duration, tx: CandidateTx) -> Self {
        Self { threshold, tx }
    }

    pub async fn run(
        self,
        mut inputs: tokio::sync::mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        let mut last_activity_wall: DateTime<Utc> = Utc::now();
        let mut last_activity_mono = Instant::now();
        let mut idle_raised = false;

        let timer = sleep(self.threshold);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = &mut timer, if !idle_raised => {
                    idle_raised = true;
                    let candidate = DriftCandidate::drift(
                        SignalKind::Idle,
                        DriftCause::Idle,
                        last_activity_wall,
                        1.0,
                    );
                    if self.tx.send(candidate).await.is_err() {
                        break;
                    }
                }
                input = inputs.recv() => match input {
                    None => break,
                    Some(()) => {
                        if idle_raised {
                            idle_raised = false;
                            let candidate = DriftCandidate::restored(
                                SignalKind::Idle,
                                Some(last_activity_mono.elapsed()),
                            );
                            if self.tx.send(candidate).await.is_err() {
                                break;
                            }
                        }
                        last_activity_wall = Utc::now();
                        last_activity_mono = Instant::now();
                        timer.as_mut().reset(Instant::now() + self.threshold);
                    }
                },
            }
        }
        log::debug!("idle watcher stopped");
    }
}
