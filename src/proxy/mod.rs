//! Proxy module for parsing and validating proxies
//!
//! This module provides functionality for:
//! - Parsing proxies from various formats (HOST:PORT, HOST:PORT:USER:PASS, URLs)
//! - Resolving proxy hosts under a hard DNS budget
//! - Probing echo endpoints through HTTP, HTTPS, SOCKS4 and SOCKS5 proxies
//! - Classifying failures and validating many proxies with bounded concurrency

pub mod classifier;
pub mod dns;
pub mod geo;
pub mod models;
pub mod parser;
pub mod prober;
pub mod scheduler;
pub mod transport;
pub mod validator;

pub use classifier::{classify, ClassifiedError, FailureKind};
pub use dns::{DnsPrecheck, Resolve, SystemResolver};
pub use geo::{GeoLocation, GeoLocator};
pub use models::{
    BatchReport, BatchStats, Proxy, ProxyAuth, ProxyType, TestOutcome, TestResult,
};
pub use parser::ProxyParser;
pub use prober::{default_endpoints, HttpProber, Probe, ProbeEndpoint, ProbeSuccess, ResponseFormat};
pub use scheduler::{BatchScheduler, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
pub use transport::{CanonicalProxyUrl, Transport};
pub use validator::{ProxyValidator, ValidatorConfig};
