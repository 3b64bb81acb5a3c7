//! The outbound HTTP seam.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use requisition_core::ViewerError;
use serde_json::Value;
use tracing::{debug, warn};

const FHIR_JSON: &str = "application/fhir+json, application/json;q=0.9";

/// Issues one GET and returns the parsed JSON body.
///
/// Implementations normalize every failure (network, non-2xx status,
/// unparsable body) into `ViewerError::Fetch`.
#[async_trait(?Send)]
pub trait FhirTransport {
    async fn get_json(&self, url: &str) -> Result<Value, ViewerError>;
}

#[async_trait(?Send)]
impl<T: FhirTransport + ?Sized> FhirTransport for &T {
    async fn get_json(&self, url: &str) -> Result<Value, ViewerError> {
        (**self).get_json(url).await
    }
}

/// `reqwest`-backed transport. Works natively and on `wasm32` (browser fetch).
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, extra headers, timeouts).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait(?Send)]
impl FhirTransport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<Value, ViewerError> {
        debug!(%url, "GET");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, FHIR_JSON)
            .send()
            .await
            .map_err(|err| ViewerError::Fetch {
                status: err.status().map(|status| status.as_u16()),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "non-success response");
            return Err(ViewerError::Fetch {
                status: Some(status.as_u16()),
                message: failure_message(status, &body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| ViewerError::Fetch {
                status: Some(status.as_u16()),
                message: format!("response body is not JSON: {err}"),
            })
    }
}

/// Prefers the server's OperationOutcome diagnostics over the bare reason phrase.
fn failure_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(operation_outcome_text)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        })
}

fn operation_outcome_text(body: &Value) -> Option<String> {
    if body.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
        return None;
    }

    let issues = body.get("issue")?.as_array()?;
    let texts: Vec<String> = issues
        .iter()
        .filter_map(|issue| {
            issue
                .get("diagnostics")
                .and_then(Value::as_str)
                .or_else(|| {
                    issue
                        .get("details")
                        .and_then(|details| details.get("text"))
                        .and_then(Value::as_str)
                })
                .map(str::to_string)
        })
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_operation_outcome_diagnostics() {
        let body = r#"{
            "resourceType": "OperationOutcome",
            "issue": [
                {"severity": "error", "code": "not-found", "diagnostics": "ServiceRequest/abc not found"}
            ]
        }"#;
        assert_eq!(
            failure_message(StatusCode::NOT_FOUND, body),
            "ServiceRequest/abc not found"
        );
    }

    #[test]
    fn falls_back_to_reason_phrase() {
        assert_eq!(
            failure_message(StatusCode::BAD_GATEWAY, "<html>oops</html>"),
            "Bad Gateway"
        );
    }
}
