use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyThresholds {
    pub good_below_ms: u64,
    pub medium_below_ms: u64,
}

impl Default for LatencyThresholds {
    fn default() -> Self {
        Self {
            good_below_ms: 100,
            medium_below_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyGrade {
    Good,
    Medium,
    Bad,
    Unreachable,
}

impl LatencyGrade {
    pub fn from_latency(latency_ms: Option<f64>, thresholds: &LatencyThresholds) -> Self {
        match latency_ms {
            Some(time) if time < thresholds.good_below_ms as f64 => LatencyGrade::Good,
            Some(time) if time < thresholds.medium_below_ms as f64 => LatencyGrade::Medium,
            Some(_) => LatencyGrade::Bad,
            None => LatencyGrade::Unreachable,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LatencyGrade::Good => "good",
            LatencyGrade::Medium => "medium",
            LatencyGrade::Bad => "bad",
            LatencyGrade::Unreachable => "unreachable",
        }
    }
}
