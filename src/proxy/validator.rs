//! Single-proxy validation: DNS precheck, transport, probing with failover

use crate::proxy::classifier::{ClassifiedError, FailureKind};
use crate::proxy::dns::{DnsPrecheck, Resolve, SystemResolver, DEFAULT_DNS_TIMEOUT};
use crate::proxy::geo::GeoLocator;
use crate::proxy::models::{Proxy, TestOutcome, TestResult};
use crate::proxy::prober::{
    default_endpoints, HttpProber, Probe, ProbeEndpoint, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_USER_AGENT,
};
use crate::proxy::transport::Transport;
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, Instrument};

/// Retries per endpoint after the first attempt
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Backoff unit; the wait before attempt `n + 1` is `n` units
const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);

/// Configuration for proxy validation
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Budget for resolving the proxy host
    pub dns_timeout: Duration,
    /// Total timeout for each probe request
    pub probe_timeout: Duration,
    /// Retries per endpoint after the first attempt
    pub max_retries: u32,
    /// Backoff unit between attempts on the same endpoint
    pub backoff: Duration,
    /// Echo endpoints in priority order
    pub endpoints: Arc<[ProbeEndpoint]>,
    /// Client identity sent with probes
    pub user_agent: String,
    /// Optional cap on one proxy's whole validation
    pub deadline: Option<Duration>,
    /// Path to MMDB file for geolocation (optional)
    pub mmdb_path: Option<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            dns_timeout: DEFAULT_DNS_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
            endpoints: default_endpoints(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            deadline: None,
            mmdb_path: None,
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<ProbeEndpoint>) -> Self {
        self.endpoints = Arc::from(endpoints);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_mmdb_path(mut self, path: String) -> Self {
        self.mmdb_path = Some(path);
        self
    }
}

/// Where a validation currently stands
enum Stage {
    DnsCheck,
    BuildingTransport,
    Probing(Transport),
    Done(TestOutcome),
}

/// Validates one proxy at a time
pub struct ProxyValidator<R = SystemResolver, P = HttpProber> {
    config: ValidatorConfig,
    resolver: R,
    prober: P,
    geo_locator: Option<GeoLocator>,
}

impl ProxyValidator {
    /// Create a validator using system DNS and real HTTP probes
    ///
    /// Fails only when a geolocation database is configured but cannot be
    /// opened.
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let prober = HttpProber::new(config.probe_timeout, config.user_agent.clone());
        let geo_locator = config
            .mmdb_path
            .as_ref()
            .map(GeoLocator::from_path)
            .transpose()?;

        let mut validator = Self::with_parts(config, SystemResolver, prober);
        validator.geo_locator = geo_locator;
        Ok(validator)
    }
}

impl<R: Resolve, P: Probe> ProxyValidator<R, P> {
    /// Create a validator from explicit resolver and prober implementations
    pub fn with_parts(config: ValidatorConfig, resolver: R, prober: P) -> Self {
        Self {
            config,
            resolver,
            prober,
            geo_locator: None,
        }
    }

    /// Validate a proxy, always producing exactly one result
    pub async fn validate(&self, proxy: &Proxy) -> TestResult {
        let started = Instant::now();
        let span = info_span!("validate", proxy = %proxy);

        let outcome = match self.config.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.run(proxy))
                    .instrument(span)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => TestOutcome::failed(
                        FailureKind::Timeout,
                        format!("validation exceeded deadline of {}ms", deadline.as_millis()),
                    ),
                }
            }
            None => self.run(proxy).instrument(span).await,
        };

        TestResult::new(proxy.clone(), outcome, started.elapsed())
    }

    async fn run(&self, proxy: &Proxy) -> TestOutcome {
        let mut stage = Stage::DnsCheck;

        loop {
            stage = match stage {
                Stage::DnsCheck => {
                    match DnsPrecheck::new(self.config.dns_timeout)
                        .check(&self.resolver, &proxy.host, proxy.port)
                        .await
                    {
                        Ok(_) => Stage::BuildingTransport,
                        Err(failure) => {
                            debug!(%failure, "DNS precheck failed");
                            Stage::Done(TestOutcome::failed(
                                FailureKind::DnsError,
                                failure.to_string(),
                            ))
                        }
                    }
                }
                Stage::BuildingTransport => Stage::Probing(Transport::build(proxy)),
                Stage::Probing(transport) => Stage::Done(self.probe_endpoints(&transport).await),
                Stage::Done(outcome) => return outcome,
            };
        }
    }

    /// Walk the endpoints in order, retrying each with backoff
    async fn probe_endpoints(&self, transport: &Transport) -> TestOutcome {
        let mut last_failure: Option<ClassifiedError> = None;

        for endpoint in self.config.endpoints.iter() {
            for attempt in 1..=self.config.max_retries + 1 {
                match self.prober.probe(transport, endpoint).await {
                    Ok(success) => {
                        debug!(
                            endpoint = %endpoint.name,
                            attempt,
                            ip = %success.ip,
                            latency_ms = success.latency.as_millis() as u64,
                            "probe succeeded"
                        );
                        let location = self
                            .geo_locator
                            .as_ref()
                            .and_then(|geo| geo.locate(&success.ip));

                        return TestOutcome::Working {
                            ip: success.ip,
                            latency_ms: success.latency.as_millis() as u64,
                            endpoint_used: endpoint.name.clone(),
                            location,
                        };
                    }
                    Err(err) => {
                        let failure = ClassifiedError::from(err);
                        debug!(
                            endpoint = %endpoint.name,
                            attempt,
                            kind = %failure.kind,
                            error = %failure.message,
                            "probe failed"
                        );

                        let abandon = failure.kind.abandons_endpoint();
                        last_failure = Some(failure);
                        if abandon {
                            break;
                        }
                        if attempt <= self.config.max_retries {
                            tokio::time::sleep(self.config.backoff * attempt).await;
                        }
                    }
                }
            }
        }

        match last_failure {
            Some(failure) => TestOutcome::failed(failure.kind, failure.message),
            None => TestOutcome::failed(FailureKind::UnknownError, "no probe endpoints configured"),
        }
    }
}
