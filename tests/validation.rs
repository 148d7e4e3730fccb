use proxy_validator::proxy::{
    BatchScheduler, FailureKind, ProbeEndpoint, ProxyParser, ProxyType, ProxyValidator,
    ResponseFormat, TestOutcome, ValidatorConfig,
};
use std::net::TcpListener;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Plain-http echo endpoints; the mock server in front answers for all of them
fn echo_endpoints() -> Vec<ProbeEndpoint> {
    vec![
        ProbeEndpoint::new("primary", "http://echo-1.test/json", ResponseFormat::JsonIp),
        ProbeEndpoint::new("backup-1", "http://echo-2.test/json", ResponseFormat::JsonIp),
        ProbeEndpoint::new("backup-2", "http://echo-3.test/json", ResponseFormat::JsonIp),
        ProbeEndpoint::new("backup-3", "http://echo-4.test/", ResponseFormat::PlainText),
    ]
}

fn config() -> ValidatorConfig {
    ValidatorConfig::new()
        .with_endpoints(echo_endpoints())
        .with_backoff(Duration::ZERO)
        .with_probe_timeout(Duration::from_secs(2))
}

/// A forward proxy that relays every request to an echo reporting `ip`
async fn forward_proxy(ip: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(r#"{{"ip":"{}"}}"#, ip)))
        .mount(&server)
        .await;
    server
}

/// An address nothing is listening on
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_working_http_proxy() {
    let server = forward_proxy("203.0.113.5").await;
    let proxy = ProxyParser::parse(&server.address().to_string(), ProxyType::Http).unwrap();
    let validator = ProxyValidator::new(config()).unwrap();

    let result = validator.validate(&proxy).await;

    match result.outcome {
        TestOutcome::Working {
            ip, endpoint_used, ..
        } => {
            assert_eq!(ip, "203.0.113.5");
            assert_eq!(endpoint_used, "primary");
        }
        other => panic!("expected a working proxy, got {:?}", other),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_refused_proxy_is_connection_refused() {
    let proxy = ProxyParser::parse(&format!("127.0.0.1:{}", closed_port()), ProxyType::Http).unwrap();
    let validator = ProxyValidator::new(config()).unwrap();

    let result = validator.validate(&proxy).await;

    assert_eq!(result.error_kind(), Some(FailureKind::ConnectionRefused));
}

#[tokio::test]
async fn test_unresolvable_proxy_is_dns_error() {
    let proxy = ProxyParser::parse("socks5://proxy.invalid:1080", ProxyType::Http).unwrap();
    let validator = ProxyValidator::new(config()).unwrap();

    let result = validator.validate(&proxy).await;

    assert_eq!(result.error_kind(), Some(FailureKind::DnsError));
    assert!(!result.is_working());
}

#[tokio::test]
async fn test_proxy_requiring_auth_fails_with_auth_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(407))
        .mount(&server)
        .await;
    let proxy = ProxyParser::parse(&server.address().to_string(), ProxyType::Http).unwrap();
    let validator = ProxyValidator::new(config()).unwrap();

    let result = validator.validate(&proxy).await;

    assert_eq!(result.error_kind(), Some(FailureKind::AuthFailed));
    // One attempt per endpoint, no retries against the same one
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_batch_mixes_working_and_failed() {
    let first = forward_proxy("203.0.113.5").await;
    let second = forward_proxy("198.51.100.7").await;
    let list = format!(
        "# mixed list\n{}\n{}\n127.0.0.1:{}\nsocks5://proxy.invalid\nnot a proxy\n",
        first.address(),
        second.address(),
        closed_port()
    );
    let proxies = ProxyParser::parse_string(&list, ProxyType::Http);
    assert_eq!(proxies.len(), 4);

    let scheduler = BatchScheduler::new(ProxyValidator::new(config()).unwrap());
    let report = scheduler.run(proxies, 3).await;

    assert_eq!(report.stats.total, 4);
    assert_eq!(report.stats.working, 2);
    assert_eq!(report.stats.failed, 2);
    assert!(report.stats.avg_latency_ms >= 0.0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stats"]["total"], 4);
    assert_eq!(json["results"].as_array().unwrap().len(), 4);
}
