//! Round-trip measurement backends.
//!
//! A [`Prober`] performs exactly one measurement per call and never retries;
//! retry policy belongs to the probe task that drives it.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::dns_cache::Resolver;
use crate::error::ProbeFailure;

mod icmp;
mod system;
mod tcp;

pub use icmp::IcmpProber;
pub use system::SystemPingProber;
pub use tcp::TcpProber;

pub const DEFAULT_TCP_PORT: u16 = 443;

#[async_trait]
pub trait Prober: Send + Sync {
    /// Measures one round trip to `address`, returning the latency in milliseconds.
    ///
    /// Must give up with [`ProbeFailure::Timeout`] once `timeout` has elapsed.
    async fn probe(&self, address: &str, timeout: Duration) -> Result<f64, ProbeFailure>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProberKind {
    /// Native ICMP when the process may open ICMP sockets, TCP connect otherwise.
    #[default]
    Auto,
    Icmp,
    System,
    Tcp,
}

impl FromStr for ProberKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ProberKind::Auto),
            "icmp" => Ok(ProberKind::Icmp),
            "system" | "ping" => Ok(ProberKind::System),
            "tcp" => Ok(ProberKind::Tcp),
            other => Err(format!("unknown prober '{other}' (expected auto, icmp, system or tcp)")),
        }
    }
}

/// Resolves `address` within `timeout`, returning the IP and the time left for the measurement.
pub(crate) async fn resolve_within(
    resolver: &Resolver,
    address: &str,
    timeout: Duration,
) -> Result<(IpAddr, Duration), ProbeFailure> {
    let started = Instant::now();
    let ip = tokio::time::timeout(timeout, resolver.resolve(address))
        .await
        .map_err(|_| ProbeFailure::Timeout)??;

    let remaining = timeout.saturating_sub(started.elapsed());
    if remaining.is_zero() {
        return Err(ProbeFailure::Timeout);
    }
    Ok((ip, remaining))
}

/// Builds the prober for `kind`. Only an explicit `Icmp` request can fail.
pub fn build_prober(kind: ProberKind, tcp_port: u16) -> std::io::Result<Arc<dyn Prober>> {
    let resolver = Arc::new(Resolver::default());

    match kind {
        ProberKind::Icmp => Ok(Arc::new(IcmpProber::new(resolver)?)),
        ProberKind::System => Ok(Arc::new(SystemPingProber::new(resolver))),
        ProberKind::Tcp => Ok(Arc::new(TcpProber::new(resolver, tcp_port))),
        ProberKind::Auto => match IcmpProber::new(resolver.clone()) {
            Ok(prober) => Ok(Arc::new(prober)),
            Err(e) => {
                warn!("ICMP sockets unavailable ({e}), falling back to TCP port {tcp_port}");
                Ok(Arc::new(TcpProber::new(resolver, tcp_port)))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prober_kind_parses() {
        assert_eq!("auto".parse::<ProberKind>(), Ok(ProberKind::Auto));
        assert_eq!("ICMP".parse::<ProberKind>(), Ok(ProberKind::Icmp));
        assert_eq!("ping".parse::<ProberKind>(), Ok(ProberKind::System));
        assert_eq!("tcp".parse::<ProberKind>(), Ok(ProberKind::Tcp));
        assert!("udp".parse::<ProberKind>().is_err());
    }

    #[test]
    fn explicit_backends_build() {
        assert_eq!(build_prober(ProberKind::Tcp, 8443).unwrap().name(), "tcp");
        assert_eq!(build_prober(ProberKind::System, 0).unwrap().name(), "system");
    }

    #[tokio::test]
    async fn resolution_shares_the_measurement_budget() {
        let resolver = Resolver::default();

        let (ip, remaining) = resolve_within(&resolver, "192.0.2.1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(ip, "192.0.2.1".parse::<IpAddr>().unwrap());
        assert!(remaining <= Duration::from_secs(1));

        assert_eq!(
            resolve_within(&resolver, "192.0.2.1", Duration::ZERO).await,
            Err(ProbeFailure::Timeout)
        );
        assert!(matches!(
            resolve_within(&resolver, "-fi0", Duration::from_secs(1)).await,
            Err(ProbeFailure::AddressResolutionFailure(_))
        ));
    }

    #[tokio::test]
    async fn auto_always_yields_a_prober() {
        let prober = build_prober(ProberKind::Auto, DEFAULT_TCP_PORT).unwrap();
        assert!(["icmp", "tcp"].contains(&prober.name()));
    }
}
