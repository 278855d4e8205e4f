//! Readiness probes for supervised services.
//!
//! Two single-shot probes (HTTP `GET`, raw TCP connect) plus a polling helper.
//! Probes never return errors: anything other than a positive answer is
//! "not ready" and is logged at `debug`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scry_core::ports::ReadinessProbe;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Default per-request timeout of a health probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// `GET <url>` answered with 2xx.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
    expect_status_ok: bool,
}

impl HttpProbe {
    /// Probe `url` with the default request timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                debug!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self {
            client,
            url: url.into(),
            expect_status_ok: false,
        }
    }

    /// Also require a JSON body with `"status": "ok"`.
    #[must_use]
    pub const fn expect_status_ok(mut self) -> Self {
        self.expect_status_ok = true;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn check(&self) -> bool {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health request failed");
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(url = %self.url, %status, "Health check returned non-success status");
            return false;
        }
        if !self.expect_status_ok {
            return true;
        }

        match response.json::<serde_json::Value>().await {
            Ok(body) if body.get("status").and_then(|s| s.as_str()) == Some("ok") => true,
            Ok(body) => {
                debug!(url = %self.url, %body, "Health body does not report ok");
                false
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health body is not JSON");
                false
            }
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// TCP connect to `host:port` succeeded within the connect timeout.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn check(&self) -> bool {
        match timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "TCP probe refused");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "TCP probe timed out");
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

/// Poll `probe` up to `attempts` times, `interval` apart.
///
/// Returns `true` on the first positive check. Does not sleep after the
/// final failed attempt.
pub async fn poll_until_ready(probe: &dyn ReadinessProbe, attempts: u32, interval: Duration) -> bool {
    for attempt in 1..=attempts {
        if probe.check().await {
            debug!(target_url = %probe.describe(), attempt, "Probe passed");
            return true;
        }
        if attempt < attempts {
            sleep(interval).await;
        }
    }
    debug!(target_url = %probe.describe(), attempts, "Probe never passed");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_probe_accepts_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let probe = HttpProbe::new(format!("{}/health", server.uri()));
        assert!(probe.check().await);
    }

    #[tokio::test]
    async fn http_probe_rejects_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = HttpProbe::new(format!("{}/health", server.uri()));
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn http_probe_can_require_ok_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "loading"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ready"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .mount(&server)
            .await;

        let loading = HttpProbe::new(format!("{}/health", server.uri())).expect_status_ok();
        assert!(!loading.check().await);
        let ready = HttpProbe::new(format!("{}/ready", server.uri())).expect_status_ok();
        assert!(ready.check().await);
    }

    #[tokio::test]
    async fn http_probe_unreachable() {
        let probe = HttpProbe::new("http://127.0.0.1:1/health");
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn tcp_probe_sees_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new("127.0.0.1", port);
        assert!(probe.check().await);
        assert_eq!(probe.describe(), format!("tcp://127.0.0.1:{port}"));

        drop(listener);
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn poll_gives_up_after_attempts() {
        let probe = TcpProbe::new("127.0.0.1", 1).with_connect_timeout(Duration::from_millis(50));
        let started = tokio::time::Instant::now();
        assert!(!poll_until_ready(&probe, 3, Duration::from_millis(20)).await);
        // two sleeps between three attempts
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
