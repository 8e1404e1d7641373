use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{Prober, resolve_within};
use crate::dns_cache::Resolver;
use crate::error::ProbeFailure;

/// Extra time the `ping` child gets over its own wait flag before it is killed.
const PROCESS_GRACE: Duration = Duration::from_millis(500);

/// Shells out to the OS `ping` utility for a single echo.
///
/// The address is resolved here first, so `ping` only ever sees an IP literal.
#[derive(Debug)]
pub struct SystemPingProber {
    resolver: Arc<Resolver>,
}

impl SystemPingProber {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }
}

fn ping_args(target: IpAddr, timeout: Duration) -> Vec<String> {
    let millis = timeout.as_millis().max(1);
    let target = target.to_string();

    if cfg!(target_os = "windows") {
        vec!["-n".into(), "1".into(), "-w".into(), millis.to_string(), target]
    } else if cfg!(target_os = "macos") {
        vec!["-c".into(), "1".into(), "-W".into(), millis.to_string(), target]
    } else {
        // iputils takes whole seconds
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), target]
    }
}

/// Extracts the round-trip time from `ping` output, e.g. `time=23.4 ms` or `time<1ms`.
fn parse_ping_time(output: &str) -> Option<f64> {
    let (line, start) = output.lines().find_map(|line| {
        line.find("time=")
            .or_else(|| line.find("time<"))
            .map(|start| (line, start))
    })?;
    let time_part = &line[start + 4..];

    if time_part.starts_with('<') {
        return Some(1.0);
    }

    let after_eq = time_part.strip_prefix('=')?;
    let end = after_eq
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(after_eq.len());
    after_eq[..end].parse::<f64>().ok()
}

fn classify_failure(output: &str) -> ProbeFailure {
    let lower = output.to_ascii_lowercase();

    if lower.contains("unknown host")
        || lower.contains("cannot resolve")
        || lower.contains("could not find host")
        || lower.contains("name or service not known")
        || lower.contains("temporary failure in name resolution")
    {
        ProbeFailure::AddressResolutionFailure(output.trim().to_string())
    } else if lower.contains("unreachable") {
        ProbeFailure::NetworkUnreachable
    } else {
        ProbeFailure::Timeout
    }
}

#[async_trait]
impl Prober for SystemPingProber {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<f64, ProbeFailure> {
        let (target, remaining) = resolve_within(&self.resolver, address, timeout).await?;

        let child = Command::new("ping")
            .args(ping_args(target, remaining))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(remaining + PROCESS_GRACE, child)
            .await
            .map_err(|_| ProbeFailure::Timeout)?
            .map_err(|e| ProbeFailure::transport(format!("failed to run ping: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            return parse_ping_time(&stdout)
                .ok_or_else(|| ProbeFailure::transport("no round-trip time in ping output"));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(&format!("{stdout}{stderr}")))
    }

    fn name(&self) -> &'static str {
        "system"
    }
}
