use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{Prober, resolve_within};
use crate::dns_cache::Resolver;
use crate::error::ProbeFailure;

/// Times a TCP handshake. Works without ICMP privileges.
pub struct TcpProber {
    resolver: Arc<Resolver>,
    port: u16,
}

impl TcpProber {
    pub fn new(resolver: Arc<Resolver>, port: u16) -> Self {
        Self { resolver, port }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<f64, ProbeFailure> {
        let (ip, remaining) = resolve_within(&self.resolver, address, timeout).await?;

        let connect_started = Instant::now();
        match tokio::time::timeout(remaining, TcpStream::connect((ip, self.port))).await {
            Err(_) => Err(ProbeFailure::Timeout),
            Ok(Ok(_stream)) => Ok(connect_started.elapsed().as_secs_f64() * 1000.0),
            // An RST still proves the host answered.
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                Ok(connect_started.elapsed().as_secs_f64() * 1000.0)
            }
            Ok(Err(e)) => Err(ProbeFailure::from_io(&e)),
        }
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn measures_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let prober = TcpProber::new(Arc::new(Resolver::default()), port);
        let latency = prober
            .probe("127.0.0.1", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(latency >= 0.0);
    }

    #[tokio::test]
    async fn refused_connection_counts_as_reply() {
        // Bind then drop to find a closed port.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let prober = TcpProber::new(Arc::new(Resolver::default()), port);
        assert!(prober.probe("127.0.0.1", Duration::from_secs(2)).await.is_ok());
    }

    #[tokio::test]
    async fn bad_address_is_resolution_failure() {
        let prober = TcpProber::new(Arc::new(Resolver::default()), 443);
        assert!(matches!(
            prober.probe("###", Duration::from_secs(1)).await,
            Err(ProbeFailure::AddressResolutionFailure(_))
        ));
    }
}
