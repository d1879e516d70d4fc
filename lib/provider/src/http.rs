//! The outbound HTTP call primitive.

use crate::error::ProviderError;
use crate::token::AccessToken;
use async_trait::async_trait;
use reqwest::{Method, Url};
use rootcause::Report;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, instrument};

/// Maximum number of response body bytes kept in an error.
const ERROR_BODY_LIMIT: usize = 512;

/// One authenticated call against a provider API.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// HTTP method.
    pub method: Method,
    /// Target URL, without the token.
    pub url: Url,
    /// Token sent as the `access_token` query parameter and bearer header.
    pub access_token: AccessToken,
    /// JSON body, if any.
    pub body: Option<JsonValue>,
}

/// The part of a provider response the dispatcher records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderResponse {
    /// HTTP status code.
    pub status: u16,
}

/// Performs provider calls.
#[async_trait]
pub trait ProviderHttp: Send + Sync {
    /// Sends one request; non-success statuses are errors.
    async fn send(&self, request: &ProviderRequest)
    -> Result<ProviderResponse, Report<ProviderError>>;
}

/// [`ProviderHttp`] backed by reqwest.
#[derive(Clone)]
pub struct ReqwestProviderHttp {
    client: reqwest::Client,
}

impl ReqwestProviderHttp {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, Report<ProviderError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::ClientSetup {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProviderHttp for ReqwestProviderHttp {
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn send(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, Report<ProviderError>> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .query(&[("access_token", request.access_token.secret())])
            .bearer_auth(request.access_token.secret());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        // The request URL carries the token; errors must not.
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    url: request.url.to_string(),
                }
            } else {
                ProviderError::Request {
                    reason: e.without_url().to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        debug!(status = status.as_u16(), "provider call succeeded");
        Ok(ProviderResponse {
            status: status.as_u16(),
        })
    }
}
