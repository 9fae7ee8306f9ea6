//! HTTP client for an external classification model.
//!
//! Speaks a small JSON contract: `POST {base_url}/v1/classify` with
//! `{"description", "amount", "type"}` and a bearer token, answered by
//! `{"category", "subcategory"?, "confidence", "merchantName"?,
//! "isRecurring"?, "recurringFrequency"?}`.

use core::future::Future;
use core::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};

use super::{ExternalClassification, ExternalClassifier};
use crate::error::{LedgerError, Result};
use crate::models::ClassificationInput;

/// Classification endpoint path.
const CLASSIFY_PATH: &str = "/v1/classify";

/// Default transport timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Builder for constructing an [`HttpClassifier`].
#[derive(Debug, Default)]
pub struct HttpClassifierBuilder {
    /// API key sent as a bearer token.
    api_key: Option<SecretString>,
    /// Service base URL.
    base_url: Option<String>,
    /// Transport timeout override.
    timeout: Option<Duration>,
}

impl HttpClassifierBuilder {
    /// Sets the API key.
    #[inline]
    #[must_use]
    pub fn api_key<T: Into<String>>(mut self, key: T) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Sets the service base URL.
    #[inline]
    #[must_use]
    pub fn base_url<T: Into<String>>(mut self, url: T) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Overrides the transport timeout (default 20 s).
    #[inline]
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the API key or base URL is missing.
    /// Returns [`LedgerError::Http`] if the HTTP client fails to build.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> Result<HttpClassifier> {
        let api_key = self
            .api_key
            .ok_or_else(|| LedgerError::Config("classifier API key is required".to_owned()))?;
        let base_url = self
            .base_url
            .map(|url| url.trim_end_matches('/').to_owned())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| LedgerError::Config("classifier base URL is required".to_owned()))?;
        tracing::debug!(base_url = %base_url, "building classifier client");
        let http = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(HttpClassifier {
            http,
            api_key,
            base_url,
        })
    }
}

/// External classifier backed by a JSON-over-HTTP model service.
///
/// Use [`HttpClassifier::builder()`] to construct an instance.
#[derive(Debug)]
pub struct HttpClassifier {
    /// Underlying HTTP client.
    http: reqwest::Client,
    /// Bearer API key.
    api_key: SecretString,
    /// Service base URL without a trailing slash.
    base_url: String,
}

impl HttpClassifier {
    /// Creates a new builder for configuring the client.
    #[inline]
    #[must_use]
    pub fn builder() -> HttpClassifierBuilder {
        HttpClassifierBuilder::default()
    }

    /// Sends the classification request.
    #[tracing::instrument(skip_all)]
    async fn post_classify(&self, input: &ClassificationInput) -> Result<ExternalClassification> {
        let url = format!("{}{CLASSIFY_PATH}", self.base_url);
        tracing::trace!(url = %url, "sending POST request");
        let response = self
            .http
            .post(&url)
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header(CONTENT_TYPE, "application/json")
            .json(input)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Checks the status and deserializes the body.
    async fn handle_response(response: reqwest::Response) -> Result<ExternalClassification> {
        let status = response.status();
        tracing::debug!(status = %status, "received response");
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(LedgerError::from)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_owned());
            Err(LedgerError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

impl ExternalClassifier for HttpClassifier {
    #[inline]
    fn classify(
        &self,
        input: &ClassificationInput,
    ) -> impl Future<Output = Result<ExternalClassification>> + Send {
        self.post_classify(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::models::TransactionKind;

    fn input() -> ClassificationInput {
        ClassificationInput::new("SQ *BLUE BOTTLE", dec!(6.50), TransactionKind::Expense)
    }

    fn client(server: &MockServer) -> HttpClassifier {
        HttpClassifier::builder()
            .api_key("test-key")
            .base_url(format!("{}/", server.uri()))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_key_and_url() {
        assert!(matches!(
            HttpClassifier::builder().base_url("http://localhost").build(),
            Err(LedgerError::Config(_))
        ));
        assert!(matches!(
            HttpClassifier::builder().api_key("k").build(),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let classifier = HttpClassifier::builder()
            .api_key("k")
            .base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(classifier.base_url, "http://localhost:8080");
    }

    #[tokio::test]
    async fn parses_success_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/classify"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "description": "SQ *BLUE BOTTLE",
                "type": "EXPENSE"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "category": "Food & Dining",
                "subcategory": "Coffee",
                "confidence": 0.93,
                "merchantName": "Blue Bottle"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server).classify(&input()).await.unwrap();
        assert_eq!(response.category, "Food & Dining");
        assert_eq!(response.merchant_name.as_deref(), Some("Blue Bottle"));
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/classify"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server).classify(&input()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Api { status: 500, ref message } if message == "overloaded"));
    }

    #[tokio::test]
    async fn malformed_body_is_serialization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/classify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"cat\":"))
            .mount(&server)
            .await;

        let err = client(&server).classify(&input()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Serialization(_)));
    }

    #[tokio::test]
    async fn slow_server_hits_transport_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"category": "X", "confidence": 1.0}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let classifier = HttpClassifier::builder()
            .api_key("k")
            .base_url(server.uri())
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let err = classifier.classify(&input()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Http(_)));
    }
}
