use std::cmp::Ordering;

use log::warn;
use serde::Serialize;

use crate::error::RunError;
use crate::latency_grade::{LatencyGrade, LatencyThresholds};
use crate::outcome::{ProbeOutcome, Statistics};

/// Ranked outcomes of a run and their summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<ProbeOutcome>,
    pub statistics: Statistics,
    /// Number of endpoints the run was asked to probe.
    pub total: usize,
    /// Set when cancellation left some endpoints without an outcome.
    pub partial: bool,
}

impl RunReport {
    pub fn reachable(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| o.reachable)
    }

    pub fn best(&self) -> Option<&ProbeOutcome> {
        self.outcomes.first().filter(|o| o.reachable)
    }
}

fn rank(a: &ProbeOutcome, b: &ProbeOutcome) -> Ordering {
    match (a.latency_ms, b.latency_ms) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Fastest first, unreachable last; equal latencies keep input order.
pub fn sort_outcomes(outcomes: &mut [ProbeOutcome]) {
    outcomes.sort_by_key(|o| o.index);
    outcomes.sort_by(rank);
}

pub fn compute_statistics(outcomes: &[ProbeOutcome], thresholds: &LatencyThresholds) -> Statistics {
    let mut stats = Statistics {
        total: outcomes.len(),
        ..Statistics::default()
    };
    let mut sum = 0.0;

    for outcome in outcomes {
        match LatencyGrade::from_latency(outcome.latency_ms, thresholds) {
            LatencyGrade::Good => stats.good += 1,
            LatencyGrade::Medium => stats.medium += 1,
            LatencyGrade::Bad => stats.bad += 1,
            LatencyGrade::Unreachable => {
                stats.unreachable += 1;
                continue;
            }
        }

        let Some(latency) = outcome.latency_ms else {
            continue;
        };
        stats.reachable += 1;
        sum += latency;
        stats.min_latency_ms = Some(stats.min_latency_ms.map_or(latency, |m| m.min(latency)));
        stats.max_latency_ms = Some(stats.max_latency_ms.map_or(latency, |m| m.max(latency)));
    }

    if stats.reachable > 0 {
        stats.mean_latency_ms = Some(sum / stats.reachable as f64);
    }
    stats
}

/// Ranks the collected outcomes.
///
/// A complete run must hold exactly one outcome per endpoint; a cancelled run is
/// reported as partial instead.
pub fn aggregate(
    mut outcomes: Vec<ProbeOutcome>,
    total: usize,
    cancelled: bool,
    thresholds: &LatencyThresholds,
) -> Result<RunReport, RunError> {
    let partial = outcomes.len() < total;
    if (partial && !cancelled) || outcomes.len() > total {
        return Err(RunError::MissingOutcomes {
            expected: total,
            actual: outcomes.len(),
        });
    }
    if partial {
        warn!("partial run: {} of {total} endpoints measured", outcomes.len());
    }

    sort_outcomes(&mut outcomes);
    let statistics = compute_statistics(&outcomes, thresholds);

    Ok(RunReport {
        outcomes,
        statistics,
        total,
        partial,
    })
}
