//! Proxy Validator
//!
//! Checks whether HTTP, HTTPS, SOCKS4 and SOCKS5 proxies actually relay
//! traffic by asking echo services for the egress IP through each of them.
//! Batches run with bounded concurrency and live progress.

pub mod error;
pub mod proxy;
pub mod tui;

pub use error::{ParseError, ProbeError, Signal};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
