//! Error types for parsing and probing proxies

use thiserror::Error;

/// Errors raised while turning loosely formatted input into a [`Proxy`].
///
/// These are returned synchronously and never reach the network layer.
///
/// [`Proxy`]: crate::proxy::Proxy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid proxy format '{input}': {reason}")]
    InvalidFormat { input: String, reason: String },
}

impl ParseError {
    pub fn invalid(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Low-level failure signal attached to a probe error when the transport
/// reports one explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ConnectionRefused,
    HostNotFound,
    ProxyAuthFailed,
    TimedOut,
}

/// Unclassified failure of a single probe attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProbeError {
    pub signal: Option<Signal>,
    pub message: String,
}

impl ProbeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            signal: None,
            message: message.into(),
        }
    }

    pub fn with_signal(signal: Signal, message: impl Into<String>) -> Self {
        Self {
            signal: Some(signal),
            message: message.into(),
        }
    }

    /// Build a probe error from a `reqwest` failure, walking its source chain
    /// for the underlying socket condition.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut signal = if err.is_timeout() {
            Some(Signal::TimedOut)
        } else {
            None
        };

        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            let text = cause.to_string();
            if signal.is_none() {
                signal = signal_from_io(cause).or_else(|| signal_from_text(&text));
            }
            if !message.contains(&text) {
                message = format!("{}: {}", message, text);
            }
            source = cause.source();
        }

        Self {
            signal: signal.or_else(|| signal_from_text(&message)),
            message,
        }
    }
}

fn signal_from_io(cause: &(dyn std::error::Error + 'static)) -> Option<Signal> {
    let io = cause.downcast_ref::<std::io::Error>()?;
    match io.kind() {
        std::io::ErrorKind::ConnectionRefused => Some(Signal::ConnectionRefused),
        std::io::ErrorKind::TimedOut => Some(Signal::TimedOut),
        _ => None,
    }
}

fn signal_from_text(text: &str) -> Option<Signal> {
    let text = text.to_lowercase();
    if text.contains("connection refused") {
        Some(Signal::ConnectionRefused)
    } else if text.contains("dns error")
        || text.contains("failed to lookup address")
        || text.contains("name or service not known")
    {
        Some(Signal::HostNotFound)
    } else if text.contains("proxy authentication required") {
        Some(Signal::ProxyAuthFailed)
    } else {
        None
    }
}
