use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::error::ProbeFailure;

/// Terminal result of probing one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub endpoint: Arc<Endpoint>,
    /// Position of the endpoint in the run's input list.
    pub index: usize,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub packet_loss: f64,
    pub attempts: u32,
    pub measured_at: DateTime<Utc>,
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn success(endpoint: Arc<Endpoint>, index: usize, latency_ms: f64, attempts: u32) -> Self {
        let failed = attempts.saturating_sub(1);
        Self {
            endpoint,
            index,
            reachable: true,
            latency_ms: Some(latency_ms),
            packet_loss: failed as f64 / attempts.max(1) as f64 * 100.0,
            attempts,
            measured_at: Utc::now(),
            failure: None,
        }
    }

    pub fn unreachable(
        endpoint: Arc<Endpoint>,
        index: usize,
        attempts: u32,
        failure: ProbeFailure,
    ) -> Self {
        Self {
            endpoint,
            index,
            reachable: false,
            latency_ms: None,
            packet_loss: 100.0,
            attempts,
            measured_at: Utc::now(),
            failure: Some(failure),
        }
    }
}

/// Summary over a finished run. Latency figures cover reachable endpoints only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub mean_latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub good: usize,
    pub medium: usize,
    pub bad: usize,
}
