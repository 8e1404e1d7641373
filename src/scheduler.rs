use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::endpoint::Endpoint;
use crate::error::RunError;
use crate::outcome::ProbeOutcome;
use crate::progress::ProgressReporter;
use crate::prober::Prober;
use crate::task::ProbeTask;

/// Outcomes in completion order, plus whether the run was cut short.
#[derive(Debug)]
pub struct ScheduleResult {
    pub outcomes: Vec<ProbeOutcome>,
    pub cancelled: bool,
}

/// Fans probe tasks out with at most `limit` in flight.
pub struct Scheduler {
    prober: Arc<dyn Prober>,
    policy: RetryPolicy,
    limit: usize,
}

impl Scheduler {
    pub fn new(
        prober: Arc<dyn Prober>,
        policy: RetryPolicy,
        limit: usize,
    ) -> Result<Self, RunError> {
        if limit == 0 {
            return Err(RunError::InvalidConcurrency(limit));
        }
        Ok(Self {
            prober,
            policy,
            limit,
        })
    }

    /// Probes every endpoint once. Returns early, with whatever finished, if `cancel` fires.
    pub async fn run(
        &self,
        endpoints: Vec<Arc<Endpoint>>,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> ScheduleResult {
        let total = endpoints.len();
        info!(
            "probing {total} endpoints via {} with up to {} in flight",
            self.prober.name(),
            self.limit
        );

        // tokio's semaphore queues waiters in FIFO order.
        let slots = Arc::new(Semaphore::new(self.limit));
        let mut queue = endpoints.into_iter().enumerate().peekable();
        let mut tasks: JoinSet<ProbeOutcome> = JoinSet::new();
        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;

        while queue.peek().is_some() || !tasks.is_empty() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok(outcome) => {
                        reporter.record(&outcome);
                        outcomes.push(outcome);
                    }
                    Err(e) => warn!("probe task ended without an outcome: {e}"),
                },

                permit = slots.clone().acquire_owned(), if queue.peek().is_some() => {
                    let Ok(permit) = permit else {
                        warn!("admission semaphore closed, stopping launches");
                        break;
                    };
                    if let Some((index, endpoint)) = queue.next() {
                        let prober = self.prober.clone();
                        let task = ProbeTask::new(endpoint, index, prober, self.policy);
                        tasks.spawn(async move {
                            let outcome = task.run().await;
                            drop(permit);
                            outcome
                        });
                    }
                }
            }
        }

        if cancelled {
            warn!(
                "run cancelled after {} of {total} outcomes, abandoning {} in-flight probes",
                outcomes.len(),
                tasks.len()
            );
            tasks.abort_all();
        }

        ScheduleResult {
            outcomes,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeFailure;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers after a delay taken from the address, e.g. "30" sleeps 30 ms.
    struct Sleepy {
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Prober for Sleepy {
        async fn probe(&self, address: &str, _timeout: Duration) -> Result<f64, ProbeFailure> {
            self.started.lock().unwrap().push(address.to_string());
            let ms: u64 = address.parse().map_err(ProbeFailure::transport)?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms as f64)
        }

        fn name(&self) -> &'static str {
            "sleepy"
        }
    }

    fn endpoints(delays: &[u64]) -> Vec<Arc<Endpoint>> {
        delays
            .iter()
            .enumerate()
            .map(|(i, d)| Arc::new(Endpoint::new(format!("ep{i}"), "", "", d.to_string())))
            .collect()
    }

    fn sleepy() -> Arc<Sleepy> {
        Arc::new(Sleepy {
            started: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(matches!(
            Scheduler::new(sleepy(), RetryPolicy::default(), 0),
            Err(RunError::InvalidConcurrency(0))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn yields_in_completion_order() {
        let scheduler = Scheduler::new(sleepy(), RetryPolicy::default(), 3).unwrap();
        let reporter = ProgressReporter::new(3, None, None);

        let result = scheduler
            .run(endpoints(&[300, 100, 200]), &reporter, &CancellationToken::new())
            .await;

        assert!(!result.cancelled);
        let order: Vec<usize> = result.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(order, [1, 2, 0]);
        assert_eq!(reporter.state().snapshot().completed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn every_endpoint_exactly_once() {
        let prober = sleepy();
        let scheduler = Scheduler::new(prober.clone(), RetryPolicy::default(), 4).unwrap();
        let delays: Vec<u64> = (0..25).map(|i| (i * 37 % 11) * 10).collect();
        let reporter = ProgressReporter::new(delays.len(), None, None);

        let result = scheduler
            .run(endpoints(&delays), &reporter, &CancellationToken::new())
            .await;

        let indices: HashSet<usize> = result.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(result.outcomes.len(), 25);
        assert_eq!(indices.len(), 25);
        assert_eq!(prober.started.lock().unwrap().len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn admission_is_fifo() {
        let prober = sleepy();
        let scheduler = Scheduler::new(prober.clone(), RetryPolicy::default(), 1).unwrap();
        let reporter = ProgressReporter::new(4, None, None);

        scheduler
            .run(endpoints(&[40, 10, 30, 20]), &reporter, &CancellationToken::new())
            .await;

        assert_eq!(*prober.started.lock().unwrap(), ["40", "10", "30", "20"]);
    }

    #[tokio::test]
    async fn empty_input_finishes_immediately() {
        let scheduler = Scheduler::new(sleepy(), RetryPolicy::default(), 2).unwrap();
        let reporter = ProgressReporter::new(0, None, None);

        let result = scheduler
            .run(Vec::new(), &reporter, &CancellationToken::new())
            .await;
        assert!(result.outcomes.is_empty());
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn pre_cancelled_run_launches_nothing() {
        let prober = sleepy();
        let scheduler = Scheduler::new(prober.clone(), RetryPolicy::default(), 2).unwrap();
        let reporter = ProgressReporter::new(3, None, None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = scheduler.run(endpoints(&[1, 2, 3]), &reporter, &cancel).await;
        assert!(result.cancelled);
        assert!(result.outcomes.is_empty());
        assert!(prober.started.lock().unwrap().is_empty());
    }
}
