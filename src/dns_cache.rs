use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::ProbeFailure;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedAddress {
    ip_address: IpAddr,
    cached_at: Instant,
}

/// Host name to address cache shared by every probe of a run.
#[derive(Debug)]
pub struct DnsCache {
    ttl: Duration,
    entries: HashMap<String, CachedAddress>,
}

impl DnsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get_valid_ip(&self, hostname: &str) -> Option<IpAddr> {
        self.entries
            .get(hostname)
            .filter(|entry| entry.cached_at.elapsed() <= self.ttl)
            .map(|entry| entry.ip_address)
    }

    pub fn insert(&mut self, hostname: String, ip_address: IpAddr) {
        self.entries.insert(
            hostname,
            CachedAddress {
                ip_address,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn clean_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.cached_at.elapsed() <= ttl);
    }
}

/// Keeps only characters valid in a host name and drops a trailing `:port`.
///
/// Names that would start with `-` are rejected; they are not valid host names and
/// would read as options on a command line.
pub(crate) fn sanitize_hostname(hostname: &str) -> Option<String> {
    let hostname = hostname.split(':').next().unwrap_or(hostname);

    let sanitized: String = hostname
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '-')
        .collect();

    if sanitized.is_empty() || sanitized.starts_with('-') {
        None
    } else {
        Some(sanitized)
    }
}

/// Turns an endpoint address into an IP, consulting the cache first.
#[derive(Debug)]
pub struct Resolver {
    cache: Mutex<DnsCache>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Resolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(DnsCache::new(ttl)),
        }
    }

    pub async fn resolve(&self, address: &str) -> Result<IpAddr, ProbeFailure> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(ip);
        }
        // Bracketed IPv6 literal, e.g. "[::1]"
        if let Ok(ip) = address.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Ok(ip);
        }

        let host = sanitize_hostname(address)
            .ok_or_else(|| ProbeFailure::AddressResolutionFailure(address.to_string()))?;

        if let Some(ip) = self.cached(&host) {
            return Ok(ip);
        }

        let ip = {
            let mut addrs = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| ProbeFailure::AddressResolutionFailure(format!("{host}: {e}")))?;
            addrs
                .next()
                .map(|addr| addr.ip())
                .ok_or_else(|| ProbeFailure::AddressResolutionFailure(host.clone()))?
        };

        debug!("resolved {host} to {ip}");
        if let Ok(mut cache) = self.cache.lock() {
            cache.clean_expired();
            cache.insert(host, ip);
        }
        Ok(ip)
    }

    fn cached(&self, host: &str) -> Option<IpAddr> {
        self.cache.lock().ok()?.get_valid_ip(host)
    }
}
