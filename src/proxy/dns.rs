//! DNS precheck for proxy hosts
//!
//! Resolving the proxy host up front, under its own short budget, keeps an
//! unresolvable proxy from holding a concurrency slot for the whole probe
//! timeout.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::lookup_host;
use tracing::debug;

/// Default budget for resolving a proxy host
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_millis(3000);

/// Name resolution used by the precheck
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system via tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(lookup_host((host, port)).await?.collect())
    }
}

/// Why a precheck did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsFailure {
    Unresolved(String),
    NoAddresses,
    TimedOut(Duration),
}

impl std::fmt::Display for DnsFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsFailure::Unresolved(e) => write!(f, "DNS resolution failed: {}", e),
            DnsFailure::NoAddresses => write!(f, "DNS resolution returned no addresses"),
            DnsFailure::TimedOut(budget) => {
                write!(f, "DNS resolution timed out after {}ms", budget.as_millis())
            }
        }
    }
}

/// Resolves a host within a fixed budget
#[derive(Debug, Clone, Copy)]
pub struct DnsPrecheck {
    budget: Duration,
}

impl Default for DnsPrecheck {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_TIMEOUT)
    }
}

impl DnsPrecheck {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Resolve `host`, returning the time the lookup took.
    ///
    /// The lookup races a timer; whichever loses is dropped.
    pub async fn check<R: Resolve + ?Sized>(
        &self,
        resolver: &R,
        host: &str,
        port: u16,
    ) -> Result<Duration, DnsFailure> {
        let start = Instant::now();

        let outcome = tokio::select! {
            resolved = resolver.resolve(host, port) => resolved,
            _ = tokio::time::sleep(self.budget) => {
                return Err(DnsFailure::TimedOut(self.budget));
            }
        };

        match outcome {
            Ok(addrs) if addrs.is_empty() => Err(DnsFailure::NoAddresses),
            Ok(addrs) => {
                let elapsed = start.elapsed();
                debug!(host, addresses = addrs.len(), elapsed_ms = elapsed.as_millis() as u64, "proxy host resolved");
                Ok(elapsed)
            }
            Err(e) => Err(DnsFailure::Unresolved(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowResolver(Duration);

    #[async_trait]
    impl Resolve for SlowResolver {
        async fn resolve(&self, _host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
            tokio::time::sleep(self.0).await;
            Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))])
        }
    }

    struct EmptyResolver;

    #[async_trait]
    impl Resolve for EmptyResolver {
        async fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_ip_literal_resolves() {
        let precheck = DnsPrecheck::default();
        assert!(precheck.check(&SystemResolver, "127.0.0.1", 8080).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_tld_fails() {
        let precheck = DnsPrecheck::default();
        let result = precheck.check(&SystemResolver, "proxy.invalid", 1080).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_slow_resolution_times_out() {
        let precheck = DnsPrecheck::new(Duration::from_millis(20));
        let result = precheck
            .check(&SlowResolver(Duration::from_secs(5)), "slow.example", 80)
            .await;
        assert_eq!(result, Err(DnsFailure::TimedOut(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn test_fast_resolution_within_budget() {
        let precheck = DnsPrecheck::new(Duration::from_secs(1));
        let elapsed = precheck
            .check(&SlowResolver(Duration::from_millis(5)), "fast.example", 80)
            .await
            .unwrap();
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_empty_answer_fails() {
        let precheck = DnsPrecheck::default();
        let result = precheck.check(&EmptyResolver, "empty.example", 80).await;
        assert_eq!(result, Err(DnsFailure::NoAddresses));
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            DnsFailure::TimedOut(Duration::from_millis(3000)).to_string(),
            "DNS resolution timed out after 3000ms"
        );
        assert!(DnsFailure::Unresolved("no such host".to_string())
            .to_string()
            .contains("no such host"));
    }
}
