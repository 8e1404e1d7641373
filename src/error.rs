use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single probe attempt did not produce a latency.
///
/// These never escape a probe task; they end up as data on the outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeFailure {
    #[error("no reply within the timeout")]
    Timeout,
    #[error("network unreachable")]
    NetworkUnreachable,
    #[error("could not resolve address: {0}")]
    AddressResolutionFailure(String),
    #[error("transport error: {0}")]
    TransportError(String),
}

impl ProbeFailure {
    pub fn transport(detail: impl std::fmt::Display) -> Self {
        ProbeFailure::TransportError(detail.to_string())
    }

    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut => ProbeFailure::Timeout,
            ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable => {
                ProbeFailure::NetworkUnreachable
            }
            _ => ProbeFailure::transport(err),
        }
    }
}

/// Fatal conditions for a whole run. Rejected before any probe starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("concurrency limit must be at least 1 (got {0})")]
    InvalidConcurrency(usize),
    #[error("run finished with {actual} outcomes for {expected} endpoints")]
    MissingOutcomes { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not find config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("medium threshold ({medium} ms) must be above good threshold ({good} ms)")]
    Thresholds { good: u64, medium: u64 },
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_errors_map_to_failure_kinds() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(ProbeFailure::from_io(&timed_out), ProbeFailure::Timeout);

        let unreachable = io::Error::new(io::ErrorKind::NetworkUnreachable, "no route");
        assert_eq!(
            ProbeFailure::from_io(&unreachable),
            ProbeFailure::NetworkUnreachable
        );

        let other = io::Error::new(io::ErrorKind::PermissionDenied, "raw socket");
        assert!(matches!(
            ProbeFailure::from_io(&other),
            ProbeFailure::TransportError(msg) if msg.contains("raw socket")
        ));
    }

    #[test]
    fn failure_serializes_with_kind_tag() {
        let json = serde_json::to_string(&ProbeFailure::Timeout).unwrap();
        assert_eq!(json, r#"{"kind":"timeout"}"#);

        let json =
            serde_json::to_string(&ProbeFailure::AddressResolutionFailure("x".into())).unwrap();
        assert_eq!(json, r#"{"kind":"address_resolution_failure","detail":"x"}"#);
    }
}
