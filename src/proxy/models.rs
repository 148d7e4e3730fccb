//! Proxy data models

use crate::error::ParseError;
use crate::proxy::classifier::FailureKind;
use crate::proxy::geo::GeoLocation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Proxy type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyType {
    /// Port used when the descriptor does not name one
    pub fn default_port(&self) -> u16 {
        match self {
            ProxyType::Http => 80,
            ProxyType::Https => 443,
            ProxyType::Socks4 | ProxyType::Socks5 => 1080,
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" | "socks5h" => Ok(ProxyType::Socks5),
            _ => Err(ParseError::invalid(
                s,
                "unknown protocol, use http, https, socks4 or socks5",
            )),
        }
    }
}

/// Proxy authentication credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyAuth {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

impl fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Canonical proxy descriptor
///
/// The port is always resolved: parsing fills in [`ProxyType::default_port`]
/// when the input leaves it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    #[serde(rename = "protocol")]
    pub proxy_type: ProxyType,
    #[serde(default, skip_serializing)]
    pub auth: Option<ProxyAuth>,
}

impl Proxy {
    /// Create a new proxy without authentication
    pub fn new(host: String, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: None,
        }
    }

    /// Create a new proxy with authentication
    pub fn with_auth(
        host: String,
        port: u16,
        proxy_type: ProxyType,
        username: String,
        password: String,
    ) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: Some(ProxyAuth::new(username, password)),
        }
    }

    /// Get the proxy string in HOST:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the proxy string with auth in HOST:PORT:USER:PASS format
    pub fn to_full_string(&self) -> String {
        match &self.auth {
            Some(auth) => format!(
                "{}:{}:{}:{}",
                self.host, self.port, auth.username, auth.password
            ),
            None => self.to_simple_string(),
        }
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.proxy_type, self.host, self.port)
    }
}

/// Terminal outcome of one validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TestOutcome {
    Working {
        ip: String,
        #[serde(rename = "latencyMs")]
        latency_ms: u64,
        #[serde(rename = "endpointUsed")]
        endpoint_used: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<GeoLocation>,
    },
    Failed {
        #[serde(rename = "errorKind")]
        error_kind: FailureKind,
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

impl TestOutcome {
    pub fn failed(error_kind: FailureKind, error_message: impl Into<String>) -> Self {
        TestOutcome::Failed {
            error_kind,
            error_message: error_message.into(),
        }
    }
}

/// Result of validating one proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(flatten)]
    pub proxy: Proxy,
    #[serde(flatten)]
    pub outcome: TestOutcome,
    pub total_time_ms: u64,
    pub checked_at: DateTime<Utc>,
}

impl TestResult {
    pub fn new(proxy: Proxy, outcome: TestOutcome, total_time: Duration) -> Self {
        Self {
            proxy,
            outcome,
            total_time_ms: total_time.as_millis() as u64,
            checked_at: Utc::now(),
        }
    }

    pub fn is_working(&self) -> bool {
        matches!(self.outcome, TestOutcome::Working { .. })
    }

    pub fn latency_ms(&self) -> Option<u64> {
        match self.outcome {
            TestOutcome::Working { latency_ms, .. } => Some(latency_ms),
            TestOutcome::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<FailureKind> {
        match self.outcome {
            TestOutcome::Failed { error_kind, .. } => Some(error_kind),
            TestOutcome::Working { .. } => None,
        }
    }
}

/// Aggregate statistics over a finished batch
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
    /// Mean latency over working results, 0 when nothing worked
    pub avg_latency_ms: f64,
}

impl BatchStats {
    pub fn from_results(results: &[TestResult]) -> Self {
        let latencies: Vec<u64> = results.iter().filter_map(TestResult::latency_ms).collect();
        let working = latencies.len();
        let avg_latency_ms = if working == 0 {
            0.0
        } else {
            latencies.iter().sum::<u64>() as f64 / working as f64
        };

        Self {
            total: results.len(),
            working,
            failed: results.len() - working,
            avg_latency_ms,
        }
    }
}

/// Results of a batch in completion order, with their statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<TestResult>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn new(results: Vec<TestResult>) -> Self {
        let stats = BatchStats::from_results(&results);
        Self { results, stats }
    }
}
