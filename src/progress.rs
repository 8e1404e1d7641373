//! Live run counters and the snapshots handed to display layers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::watch;

use crate::outcome::ProbeOutcome;

/// Counters for one run. Only the outcome-collection path increments them.
#[derive(Debug, Default)]
pub struct ScheduleState {
    total: usize,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl ScheduleState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            completed: self.completed.load(Ordering::Acquire),
            succeeded: self.succeeded.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Folds each outcome into the counters and fans the new snapshot out.
///
/// Publishing never waits: the watch channel keeps only the latest value and the
/// callback runs inline, so it must be cheap.
pub struct ProgressReporter {
    state: Arc<ScheduleState>,
    sender: Option<watch::Sender<ProgressSnapshot>>,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(
        total: usize,
        sender: Option<watch::Sender<ProgressSnapshot>>,
        callback: Option<ProgressCallback>,
    ) -> Self {
        let reporter = Self {
            state: Arc::new(ScheduleState::new(total)),
            sender,
            callback,
        };
        reporter.publish(reporter.state.snapshot());
        reporter
    }

    pub fn state(&self) -> Arc<ScheduleState> {
        self.state.clone()
    }

    pub fn record(&self, outcome: &ProbeOutcome) -> ProgressSnapshot {
        let state = &self.state;
        if outcome.reachable {
            state.succeeded.fetch_add(1, Ordering::AcqRel);
        } else {
            state.failed.fetch_add(1, Ordering::AcqRel);
        }
        // Bumped last so completed == succeeded + failed whenever it is observed.
        state.completed.fetch_add(1, Ordering::AcqRel);

        let snapshot = state.snapshot();
        self.publish(snapshot);
        snapshot
    }

    fn publish(&self, snapshot: ProgressSnapshot) {
        if let Some(sender) = &self.sender {
            sender.send_replace(snapshot);
        }
        if let Some(callback) = &self.callback {
            callback(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::error::ProbeFailure;
    use std::sync::Mutex;

    fn outcome(reachable: bool) -> ProbeOutcome {
        let endpoint = Arc::new(Endpoint::new("fr1.relay.net", "France", "Paris", "10.2.2.2"));
        if reachable {
            ProbeOutcome::success(endpoint, 0, 30.0, 1)
        } else {
            ProbeOutcome::unreachable(endpoint, 0, 1, ProbeFailure::Timeout)
        }
    }

    #[test]
    fn counts_split_by_reachability() {
        let reporter = ProgressReporter::new(3, None, None);
        reporter.record(&outcome(true));
        reporter.record(&outcome(false));
        let snap = reporter.record(&outcome(true));

        assert_eq!(
            snap,
            ProgressSnapshot {
                total: 3,
                completed: 3,
                succeeded: 2,
                failed: 1
            }
        );
        assert!(snap.is_finished());
    }

    #[test]
    fn watch_receiver_sees_latest_snapshot_without_reading_each() {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        let reporter = ProgressReporter::new(2, Some(tx), None);
        assert_eq!(rx.borrow().total, 2);

        reporter.record(&outcome(true));
        reporter.record(&outcome(true));
        assert_eq!(rx.borrow().completed, 2);
    }

    #[test]
    fn dropped_receiver_does_not_block_or_fail() {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        drop(rx);
        let reporter = ProgressReporter::new(1, Some(tx), None);
        assert_eq!(reporter.record(&outcome(false)).failed, 1);
    }

    #[test]
    fn callback_observes_monotonic_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |s: &ProgressSnapshot| {
            sink.lock().unwrap().push(s.completed);
        });

        let reporter = ProgressReporter::new(4, None, Some(callback));
        for reachable in [true, false, false, true] {
            reporter.record(&outcome(reachable));
        }

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![0, 1, 2, 3, 4]);
        assert!(seen.iter().all(|&c| c <= 4));
    }

    #[test]
    fn concurrent_records_do_not_race() {
        let reporter = Arc::new(ProgressReporter::new(800, None, None));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        reporter.record(&outcome(i % 2 == 0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = reporter.state().snapshot();
        assert_eq!(snap.completed, 800);
        assert_eq!(snap.succeeded, 400);
        assert_eq!(snap.failed, 400);
    }
}
