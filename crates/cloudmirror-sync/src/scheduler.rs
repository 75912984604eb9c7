//! Cycle scheduler - repeats sync cycles until shutdown
//!
//! The [`CycleScheduler`] runs a [`CycleRunner`] in a loop. The scan
//! interval is measured from the end of one cycle to the start of the
//! next, so cycles never overlap and a slow cycle is never interrupted by
//! the timer.
//!
//! ## Flow
//!
//! ```text
//!   run_once ──→ wait(interval | settled watcher changes | shutdown) ──→ run_once ...
//!                          │
//!   FileWatcher ──→ mpsc::Receiver ──→ DebouncedChangeQueue
//! ```
//!
//! A failed cycle is logged and the loop carries on with the next interval.
//! Shutdown is observed between cycles, during the wait, and by the engine
//! between files.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cloudmirror_core::domain::SessionLog;

use crate::engine::CycleRunner;
use crate::watcher::{ChangeEvent, DebouncedChangeQueue};
use crate::SyncError;

/// How often pending watcher events are checked for settlement
const SETTLE_POLL: Duration = Duration::from_millis(100);

/// Totals for the lifetime of a scheduler
#[derive(Debug, Clone, Default)]
pub struct SchedulerSummary {
    /// Cycles that ran to completion (including cancelled ones)
    pub cycles: u64,
    /// Cycles aborted with an error
    pub failed_cycles: u64,
    /// Every action taken, in order
    pub session_log: SessionLog,
}

/// Why the scheduler stopped waiting
#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Interval,
    Changes,
    Shutdown,
}

pub struct CycleScheduler {
    runner: Arc<dyn CycleRunner>,
    interval: Duration,
    changes: Option<mpsc::Receiver<ChangeEvent>>,
    queue: DebouncedChangeQueue,
}

impl CycleScheduler {
    pub fn new(runner: Arc<dyn CycleRunner>, interval: Duration) -> Self {
        info!(interval_secs = interval.as_secs(), "Creating cycle scheduler");
        Self {
            runner,
            interval,
            changes: None,
            queue: DebouncedChangeQueue::new(Duration::ZERO),
        }
    }

    /// Wake early once watcher events have been quiet for `debounce`
    pub fn with_changes(mut self, rx: mpsc::Receiver<ChangeEvent>, debounce: Duration) -> Self {
        self.changes = Some(rx);
        self.queue = DebouncedChangeQueue::new(debounce);
        self
    }

    /// Run cycles until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) -> SchedulerSummary {
        let mut summary = SchedulerSummary::default();
        info!("Cycle scheduler starting");

        loop {
            match self.runner.run_once(&cancel).await {
                Ok(outcome) => {
                    summary.cycles += 1;
                    summary.session_log.extend(outcome.session_log);
                }
                Err(SyncError::AuthExpired(msg)) => {
                    summary.failed_cycles += 1;
                    error!(
                        reason = %msg,
                        "Remote store rejected credentials; store a fresh token to resume"
                    );
                }
                Err(err) => {
                    summary.failed_cycles += 1;
                    error!(error = %err, "Sync cycle failed, will retry next interval");
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            match self.wait(&cancel).await {
                Wake::Shutdown => break,
                Wake::Interval => debug!("Scan interval elapsed"),
                Wake::Changes => info!("Local changes settled, starting cycle early"),
            }
        }

        info!(
            cycles = summary.cycles,
            failed_cycles = summary.failed_cycles,
            actions = summary.session_log.len(),
            "Cycle scheduler stopped"
        );
        summary
    }

    async fn wait(&mut self, cancel: &CancellationToken) -> Wake {
        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);
        let mut settle = tokio::time::interval(SETTLE_POLL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Wake::Shutdown,
                _ = &mut sleep => {
                    self.queue.clear();
                    return Wake::Interval;
                }
                event = next_change(&mut self.changes) => {
                    match event {
                        Some(change) => {
                            if change.wants_sync() {
                                self.queue.push(change);
                            }
                        }
                        None => {
                            warn!("Change channel closed, falling back to interval only");
                            self.changes = None;
                        }
                    }
                }
                _ = settle.tick(), if !self.queue.is_empty() => {
                    let settled = self.queue.poll();
                    if !settled.is_empty() {
                        for event in &settled {
                            debug!(path = %event.path().display(), "Settled");
                        }
                        return Wake::Changes;
                    }
                }
            }
        }
    }
}

/// Receive from an optional channel; pending forever when absent
async fn next_change(rx: &mut Option<mpsc::Receiver<ChangeEvent>>) -> Option<ChangeEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
