//! Maps low-level probe failures onto a closed set of failure kinds

use crate::error::{ProbeError, Signal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phrases proxies and SOCKS libraries use when credentials are rejected
const AUTH_FAILURE_PHRASES: &[&str] = &[
    "proxy authentication required",
    "authentication failed",
    "authentication rejected",
    "auth failure",
    "invalid credentials",
];

/// Semantic failure kind reported in a failed `TestResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DnsError,
    ConnectionRefused,
    Timeout,
    HostNotFound,
    AuthFailed,
    UnknownError,
}

impl FailureKind {
    /// Whether this failure is definitive for the endpoint being probed, so
    /// retrying the same endpoint is pointless.
    pub fn abandons_endpoint(&self) -> bool {
        matches!(self, FailureKind::ConnectionRefused | FailureKind::AuthFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::DnsError => "dns_error",
            FailureKind::ConnectionRefused => "connection_refused",
            FailureKind::Timeout => "timeout",
            FailureKind::HostNotFound => "host_not_found",
            FailureKind::AuthFailed => "auth_failed",
            FailureKind::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A probe failure together with its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: FailureKind,
    pub message: String,
}

impl From<ProbeError> for ClassifiedError {
    fn from(err: ProbeError) -> Self {
        Self {
            kind: classify(&err),
            message: err.message,
        }
    }
}

/// Classify a probe failure. The first matching rule wins.
pub fn classify(err: &ProbeError) -> FailureKind {
    let message = err.message.to_lowercase();

    match err.signal {
        Some(Signal::ConnectionRefused) => return FailureKind::ConnectionRefused,
        Some(Signal::HostNotFound) => return FailureKind::HostNotFound,
        _ => {}
    }

    if err.signal == Some(Signal::ProxyAuthFailed)
        || AUTH_FAILURE_PHRASES.iter().any(|p| message.contains(p))
    {
        return FailureKind::AuthFailed;
    }

    if err.signal == Some(Signal::TimedOut)
        || message.contains("timeout")
        || message.contains("timed out")
    {
        return FailureKind::Timeout;
    }

    if message.contains("dns") {
        return FailureKind::DnsError;
    }

    FailureKind::UnknownError
}
