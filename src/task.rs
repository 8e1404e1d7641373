use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::debug;

use crate::config::RetryPolicy;
use crate::endpoint::Endpoint;
use crate::error::ProbeFailure;
use crate::outcome::ProbeOutcome;
use crate::prober::Prober;

/// Slack allowed on top of the policy timeout before an attempt is cut off here.
pub const ATTEMPT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug)]
enum TaskState {
    Pending,
    Attempting { attempts_used: u32 },
    Retrying { attempts_used: u32, failure: ProbeFailure },
    Succeeded { attempts_used: u32, latency_ms: f64 },
    Exhausted { attempts_used: u32, failure: ProbeFailure },
}

/// Drives the prober against one endpoint until it answers or the retry budget runs out.
pub struct ProbeTask {
    endpoint: Arc<Endpoint>,
    index: usize,
    prober: Arc<dyn Prober>,
    policy: RetryPolicy,
}

impl ProbeTask {
    pub fn new(
        endpoint: Arc<Endpoint>,
        index: usize,
        prober: Arc<dyn Prober>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            endpoint,
            index,
            prober,
            policy,
        }
    }

    /// Always yields an outcome; prober errors and panics become unreachable data.
    pub async fn run(self) -> ProbeOutcome {
        let mut state = TaskState::Pending;

        loop {
            state = match state {
                TaskState::Pending => TaskState::Attempting { attempts_used: 0 },
                TaskState::Attempting { attempts_used } => match self.attempt().await {
                    Ok(latency_ms) => TaskState::Succeeded {
                        attempts_used,
                        latency_ms,
                    },
                    Err(failure) if attempts_used + 1 < self.policy.max_attempts() => {
                        TaskState::Retrying {
                            attempts_used: attempts_used + 1,
                            failure,
                        }
                    }
                    Err(failure) => TaskState::Exhausted {
                        attempts_used,
                        failure,
                    },
                },
                TaskState::Retrying {
                    attempts_used,
                    failure,
                } => {
                    debug!(
                        "{}: attempt {attempts_used} failed ({failure}), retrying",
                        self.endpoint.hostname
                    );
                    if !self.policy.retry_delay.is_zero() {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                    TaskState::Attempting { attempts_used }
                }
                TaskState::Succeeded {
                    attempts_used,
                    latency_ms,
                } => {
                    debug!("{}: {latency_ms:.1} ms", self.endpoint.hostname);
                    return ProbeOutcome::success(
                        self.endpoint,
                        self.index,
                        latency_ms,
                        attempts_used + 1,
                    );
                }
                TaskState::Exhausted {
                    attempts_used,
                    failure,
                } => {
                    debug!(
                        "{}: unreachable after {} attempts ({failure})",
                        self.endpoint.hostname,
                        attempts_used + 1
                    );
                    return ProbeOutcome::unreachable(
                        self.endpoint,
                        self.index,
                        attempts_used + 1,
                        failure,
                    );
                }
            };
        }
    }

    async fn attempt(&self) -> Result<f64, ProbeFailure> {
        let probe = self.prober.probe(self.endpoint.target(), self.policy.timeout);
        let guarded = AssertUnwindSafe(probe).catch_unwind();

        match tokio::time::timeout(self.policy.timeout + ATTEMPT_GRACE, guarded).await {
            Err(_) => Err(ProbeFailure::Timeout),
            Ok(Err(_panic)) => Err(ProbeFailure::transport(format!(
                "{} prober panicked",
                self.prober.name()
            ))),
            Ok(Ok(Ok(latency_ms))) if latency_ms.is_finite() && latency_ms >= 0.0 => {
                Ok(latency_ms)
            }
            Ok(Ok(Ok(latency_ms))) => Err(ProbeFailure::transport(format!(
                "invalid latency {latency_ms}"
            ))),
            Ok(Ok(Err(failure))) => Err(failure),
        }
    }
}
