use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, ICMP, IcmpPacket, PingIdentifier, PingSequence, SurgeError};

use super::{Prober, resolve_within};
use crate::dns_cache::Resolver;
use crate::error::ProbeFailure;

/// Echo request/reply over ICMP sockets, one client per address family.
pub struct IcmpProber {
    v4: Client,
    v6: Option<Client>,
    resolver: Arc<Resolver>,
    next_identifier: AtomicU16,
}

impl IcmpProber {
    /// Opens the ICMP sockets. Fails when the OS refuses them (missing privileges).
    pub fn new(resolver: Arc<Resolver>) -> std::io::Result<Self> {
        let v4 = Client::new(&Config::default())?;
        // Hosts without IPv6 still get a working prober.
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build()).ok();

        Ok(Self {
            v4,
            v6,
            resolver,
            next_identifier: AtomicU16::new(1),
        })
    }

    fn client_for(&self, ip: IpAddr) -> Result<&Client, ProbeFailure> {
        match ip {
            IpAddr::V4(_) => Ok(&self.v4),
            IpAddr::V6(_) => self.v6.as_ref().ok_or(ProbeFailure::NetworkUnreachable),
        }
    }
}

fn classify(err: SurgeError) -> ProbeFailure {
    match err {
        SurgeError::Timeout { .. } => ProbeFailure::Timeout,
        SurgeError::IOError(e) => ProbeFailure::from_io(&e),
        other => ProbeFailure::transport(other),
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<f64, ProbeFailure> {
        let (target_ip, remaining) = resolve_within(&self.resolver, address, timeout).await?;
        let client = self.client_for(target_ip)?;

        // Distinct identifiers keep concurrent echoes to the same host apart.
        let identifier = self.next_identifier.fetch_add(1, Ordering::Relaxed);
        let mut pinger = client.pinger(target_ip, PingIdentifier(identifier)).await;
        pinger.timeout(remaining);

        match pinger.ping(PingSequence(0), &[0; 16]).await {
            Ok((IcmpPacket::V4(_), duration)) | Ok((IcmpPacket::V6(_), duration)) => {
                Ok(duration.as_secs_f64() * 1000.0)
            }
            Err(e) => Err(classify(e)),
        }
    }

    fn name(&self) -> &'static str {
        "icmp"
    }
}
