pub mod aggregator;
pub mod config;
pub mod dns_cache;
pub mod endpoint;
pub mod error;
pub mod latency_grade;
pub mod outcome;
pub mod progress;
pub mod prober;
pub mod report;
pub mod scheduler;
pub mod task;

use std::sync::Arc;

use log::info;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub use aggregator::RunReport;
pub use config::{AppConfig, RetryPolicy, effective_concurrency};
pub use endpoint::Endpoint;
pub use error::{ProbeFailure, RunError};
pub use latency_grade::{LatencyGrade, LatencyThresholds};
pub use outcome::{ProbeOutcome, Statistics};
pub use progress::{ProgressCallback, ProgressSnapshot};
pub use prober::{Prober, ProberKind};
pub use scheduler::Scheduler;

/// Optional hooks for a run: where progress goes, how it is stopped, how latencies are bucketed.
#[derive(Default)]
pub struct RunOptions {
    pub progress: Option<watch::Sender<ProgressSnapshot>>,
    pub on_progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
    pub thresholds: LatencyThresholds,
}

impl RunOptions {
    pub fn with_progress(mut self, sender: watch::Sender<ProgressSnapshot>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn on_progress(
        mut self,
        callback: impl Fn(&ProgressSnapshot) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_thresholds(mut self, thresholds: LatencyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

/// Probes every endpoint with at most `concurrency_limit` probes in flight and ranks the results.
///
/// Individual endpoint failures never fail the run; they show up as unreachable
/// outcomes. The only errors are a zero limit, rejected before anything is probed,
/// and an outcome count that does not match the input on an uncancelled run.
pub async fn run(
    endpoints: Vec<Endpoint>,
    prober: Arc<dyn Prober>,
    policy: RetryPolicy,
    concurrency_limit: usize,
    options: RunOptions,
) -> Result<RunReport, RunError> {
    let scheduler = Scheduler::new(prober, policy, concurrency_limit)?;

    let total = endpoints.len();
    let endpoints: Vec<Arc<Endpoint>> = endpoints.into_iter().map(Arc::new).collect();
    let reporter = progress::ProgressReporter::new(total, options.progress, options.on_progress);

    let result = scheduler.run(endpoints, &reporter, &options.cancel).await;
    let report =
        aggregator::aggregate(result.outcomes, total, result.cancelled, &options.thresholds)?;

    info!(
        "{} reachable, {} unreachable",
        report.statistics.reachable, report.statistics.unreachable
    );
    Ok(report)
}
