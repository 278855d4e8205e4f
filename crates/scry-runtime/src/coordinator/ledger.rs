//! HTTP client for the operations ledger.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scry_core::ports::OperationsLedger;
use scry_core::{ApplyOutcome, LedgerError};
use tracing::debug;

/// Posts outcomes to `{base_url}/model-ready`.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: Client,
    endpoint: String,
}

impl HttpLedger {
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                debug!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self {
            client,
            endpoint: format!("{}/model-ready", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OperationsLedger for HttpLedger {
    async fn notify(&self, outcome: ApplyOutcome) -> Result<(), LedgerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&outcome)
            .send()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Status(status.as_u16()));
        }
        debug!(operation_id = %outcome.operation_id, success = outcome.success, "Ledger notified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_outcome_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/model-ready"))
            .and(body_json(serde_json::json!({
                "operation_id": "op-1",
                "success": true,
                "message": "Server restarted successfully",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ledger = HttpLedger::new(&format!("{}/", server.uri()), Duration::from_secs(5));
        ledger.notify(ApplyOutcome::success("op-1")).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ledger = HttpLedger::new(&server.uri(), Duration::from_secs(5));
        let err = ledger
            .notify(ApplyOutcome::failure("op-2", "boom"))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Status(500));
    }
}
