//! Rt HTTP Client implementation

use std::time::Duration;

use reqwest::{Client, StatusCode};
use rt_core::{EstimationResult, IncidenceRequest};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, RtClientError};

/// Default request timeout. Uncached estimations run a thousand resamples,
/// so this is generous.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body returned by the gateway
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[allow(dead_code)]
    error: String,
    message: String,
}

/// Rt estimation gateway client
#[derive(Debug, Clone)]
pub struct RtClient {
    client: Client,
    base_url: Url,
}

impl RtClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the gateway (e.g., "http://localhost:5000")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a new client with custom timeouts
    pub fn with_config(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        let base_url = Url::parse(base_url)?;

        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check server health
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<String> {
        let url = self.base_url.join("/health")?;
        let response = self.client.get(url).send().await?;

        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Estimate the time-varying reproduction number for `request`
    #[instrument(skip(self, request), fields(days = request.data.len()))]
    pub async fn estimate(&self, request: &IncidenceRequest) -> Result<EstimationResult> {
        let url = self.base_url.join("/rt")?;
        debug!("Requesting Rt estimate from {}", url);

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RtClientError::Timeout
                } else {
                    RtClientError::HttpError(e)
                }
            })?;
        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| RtClientError::ParseError(e.to_string()))
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract error from failed response
    async fn extract_error(&self, response: reqwest::Response) -> RtClientError {
        let status = response.status();
        let message = match response.json::<ErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => format!("HTTP {}", status),
        };

        match status {
            StatusCode::BAD_REQUEST => RtClientError::InvalidRequest(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RtClientError::Timeout,
            _ => RtClientError::server_error(status.as_u16(), message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RtClient::new("http://localhost:5000");
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let client = RtClient::new("not a url");
        assert!(matches!(client, Err(RtClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_base_url() {
        let client = RtClient::new("http://localhost:5000").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:5000/");
    }
}
