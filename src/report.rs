use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregator::RunReport;
use crate::error::ConfigError;

#[derive(Serialize)]
struct SavedReport<'a> {
    generated_at: DateTime<Utc>,
    prober: &'a str,
    #[serde(flatten)]
    report: &'a RunReport,
}

/// Writes a finished run as pretty JSON, creating parent directories as needed.
pub fn save_report(report: &RunReport, prober: &str, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let saved = SavedReport {
        generated_at: Utc::now(),
        prober,
        report,
    };
    fs::write(path, serde_json::to_string_pretty(&saved)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::endpoint::Endpoint;
    use crate::error::ProbeFailure;
    use crate::latency_grade::LatencyThresholds;
    use crate::outcome::ProbeOutcome;
    use std::sync::Arc;

    #[test]
    fn writes_ranked_outcomes_and_statistics() {
        let fast = Arc::new(Endpoint::new("ch1.relay.net", "Switzerland", "Zurich", "10.9.9.9"));
        let dead = Arc::new(Endpoint::new("ch2.relay.net", "Switzerland", "Geneva", "10.9.9.8"));
        let outcomes = vec![
            ProbeOutcome::unreachable(dead, 1, 2, ProbeFailure::NetworkUnreachable),
            ProbeOutcome::success(fast, 0, 18.25, 1),
        ];
        let report = aggregate(outcomes, 2, false, &LatencyThresholds::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("latest.json");
        save_report(&report, "tcp", &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["prober"], "tcp");
        assert_eq!(json["partial"], false);
        assert_eq!(json["statistics"]["reachable"], 1);
        assert_eq!(json["outcomes"][0]["endpoint"]["city"], "Zurich");
        assert_eq!(json["outcomes"][0]["latency_ms"], 18.25);
        assert!(json["outcomes"][1]["latency_ms"].is_null());
        assert_eq!(json["outcomes"][1]["failure"]["kind"], "network_unreachable");
    }
}
