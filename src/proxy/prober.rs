//! Echo endpoint probing through a transport

use crate::error::{ProbeError, Signal};
use crate::proxy::transport::Transport;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default total timeout for a probe request
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client identity sent with every probe
pub const DEFAULT_USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    " (proxy health check)"
);

/// Shape of an echo service's response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseFormat {
    /// JSON object with an `ip` field
    JsonIp,
    /// Bare IP address as text
    PlainText,
}

/// An external "what is my IP" service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeEndpoint {
    pub name: String,
    pub url: String,
    pub format: ResponseFormat,
}

impl ProbeEndpoint {
    pub fn new(name: &str, url: &str, format: ResponseFormat) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            format,
        }
    }
}

/// Echo services in priority order: the primary first, then the backups
pub fn default_endpoints() -> Arc<[ProbeEndpoint]> {
    Arc::from(vec![
        ProbeEndpoint::new(
            "ipify",
            "https://api.ipify.org?format=json",
            ResponseFormat::JsonIp,
        ),
        ProbeEndpoint::new("ipinfo", "https://ipinfo.io/json", ResponseFormat::JsonIp),
        ProbeEndpoint::new("myip", "https://api.myip.com", ResponseFormat::JsonIp),
        ProbeEndpoint::new(
            "icanhazip",
            "https://icanhazip.com",
            ResponseFormat::PlainText,
        ),
    ])
}

/// A successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSuccess {
    pub ip: String,
    pub latency: Duration,
}

/// Issues one probe request through a transport
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(
        &self,
        transport: &Transport,
        endpoint: &ProbeEndpoint,
    ) -> Result<ProbeSuccess, ProbeError>;
}

/// Probes endpoints over real HTTP
#[derive(Debug, Clone)]
pub struct HttpProber {
    timeout: Duration,
    user_agent: String,
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT, DEFAULT_USER_AGENT.to_string())
    }
}

impl HttpProber {
    pub fn new(timeout: Duration, user_agent: String) -> Self {
        Self {
            timeout,
            user_agent,
        }
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(
        &self,
        transport: &Transport,
        endpoint: &ProbeEndpoint,
    ) -> Result<ProbeSuccess, ProbeError> {
        let start = Instant::now();
        let response = transport
            .get(&endpoint.url, self.timeout, &self.user_agent)
            .await?;

        let status = response.status();
        if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(ProbeError::with_signal(
                Signal::ProxyAuthFailed,
                format!("HTTP status: {}", status),
            ));
        }
        if status != StatusCode::OK {
            return Err(ProbeError::new(format!("HTTP status: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::from_reqwest(&e))?;
        let latency = start.elapsed();

        let ip = extract_ip(&body).ok_or_else(|| {
            ProbeError::new(format!("no IP address in response from {}", endpoint.name))
        })?;

        Ok(ProbeSuccess { ip, latency })
    }
}

/// Pull the egress IP out of an echo response body
///
/// A JSON object's `ip` field wins whatever the endpoint's declared format;
/// anything else is read as a bare address.
pub fn extract_ip(body: &str) -> Option<String> {
    let candidate = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => map.get("ip")?.as_str()?.trim().to_string(),
        _ => body.trim().to_string(),
    };

    candidate.parse::<IpAddr>().ok()?;
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::{Proxy, ProxyType};
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// The mock server plays the forward proxy: plain-http targets reach it as
    /// absolute-form GET requests.
    async fn forward_proxy(response: ResponseTemplate) -> (MockServer, Transport) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(response)
            .mount(&server)
            .await;

        let addr = server.address();
        let proxy = Proxy::new(addr.ip().to_string(), addr.port(), ProxyType::Http);
        (server, Transport::build(&proxy))
    }

    fn echo() -> ProbeEndpoint {
        ProbeEndpoint::new("echo", "http://echo.test/ip", ResponseFormat::JsonIp)
    }

    #[test]
    fn test_extract_ip_json() {
        assert_eq!(
            extract_ip(r#"{"ip":"203.0.113.5"}"#),
            Some("203.0.113.5".to_string())
        );
        assert_eq!(
            extract_ip(r#"{"ip":"2001:db8::1","country":"US"}"#),
            Some("2001:db8::1".to_string())
        );
    }

    #[test]
    fn test_extract_ip_plain_text() {
        assert_eq!(
            extract_ip("198.51.100.7\n"),
            Some("198.51.100.7".to_string())
        );
        // Structured bodies are honoured even from plain-text endpoints
        assert_eq!(
            extract_ip(r#"{"ip":"198.51.100.7"}"#),
            Some("198.51.100.7".to_string())
        );
    }

    #[test]
    fn test_extract_ip_rejects_garbage() {
        assert_eq!(extract_ip(r#"{"origin":"1.2.3.4"}"#), None);
        assert_eq!(extract_ip("<html>blocked</html>"), None);
        assert_eq!(extract_ip(""), None);
        assert_eq!(extract_ip(r#"{"ip": 42}"#), None);
    }

    #[test]
    fn test_default_endpoints_order() {
        let endpoints = default_endpoints();
        assert_eq!(endpoints.len(), 4);
        assert_eq!(endpoints[0].name, "ipify");
        assert!(endpoints.iter().all(|e| e.url.starts_with("https://")));
    }

    #[tokio::test]
    async fn test_probe_through_http_proxy() {
        let (server, transport) = forward_proxy(
            ResponseTemplate::new(200).set_body_string(r#"{"ip":"203.0.113.5"}"#),
        )
        .await;

        let success = HttpProber::default().probe(&transport, &echo()).await.unwrap();
        assert_eq!(success.ip, "203.0.113.5");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_sends_client_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.9"))
            .mount(&server)
            .await;
        let addr = server.address();
        let transport = Transport::build(&Proxy::new(
            addr.ip().to_string(),
            addr.port(),
            ProxyType::Http,
        ));
        let endpoint = ProbeEndpoint::new("plain", "http://echo.test/", ResponseFormat::PlainText);

        let success = HttpProber::default().probe(&transport, &endpoint).await.unwrap();
        assert_eq!(success.ip, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_probe_rejects_non_200() {
        let (_server, transport) = forward_proxy(ResponseTemplate::new(503)).await;
        let err = HttpProber::default().probe(&transport, &echo()).await.unwrap_err();
        assert!(err.message.contains("503"));
        assert_eq!(err.signal, None);
    }

    #[tokio::test]
    async fn test_probe_flags_proxy_auth_required() {
        let (_server, transport) = forward_proxy(ResponseTemplate::new(407)).await;
        let err = HttpProber::default().probe(&transport, &echo()).await.unwrap_err();
        assert_eq!(err.signal, Some(Signal::ProxyAuthFailed));
    }

    #[tokio::test]
    async fn test_probe_times_out() {
        let (_server, transport) = forward_proxy(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"ip":"203.0.113.5"}"#)
                .set_delay(Duration::from_secs(2)),
        )
        .await;

        let prober = HttpProber::new(Duration::from_millis(100), DEFAULT_USER_AGENT.to_string());
        let err = prober.probe(&transport, &echo()).await.unwrap_err();
        assert_eq!(err.signal, Some(Signal::TimedOut));
    }
}
