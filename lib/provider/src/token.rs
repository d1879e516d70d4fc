//! Access tokens for provider calls.
//!
//! A token is either configured on the node or minted per call through an
//! OAuth 2.0 client-credentials exchange. Tokens are never cached; each action
//! that needs one performs its own exchange.

use crate::error::ProviderError;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{ClientId, ClientSecret, RequestTokenError, TokenResponse, TokenUrl};
use rootcause::Report;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// A bearer token. The secret is not printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a token value.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the token value.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Parameters of a client-credentials exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentialsRequest {
    /// OAuth token endpoint.
    pub token_url: String,
    /// Client id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentialsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsRequest")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Exchanges client credentials for an access token.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Performs one client-credentials grant.
    async fn issue(
        &self,
        request: &ClientCredentialsRequest,
    ) -> Result<AccessToken, Report<ProviderError>>;
}

/// [`TokenIssuer`] backed by the `oauth2` crate.
///
/// Client id and secret are sent with HTTP basic authentication.
#[derive(Clone)]
pub struct OAuthTokenIssuer {
    http: reqwest::Client,
}

impl OAuthTokenIssuer {
    /// Creates an issuer whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, Report<ProviderError>> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::ClientSetup {
                reason: e.to_string(),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TokenIssuer for OAuthTokenIssuer {
    #[instrument(skip_all, fields(token_url = %request.token_url))]
    async fn issue(
        &self,
        request: &ClientCredentialsRequest,
    ) -> Result<AccessToken, Report<ProviderError>> {
        let token_url =
            TokenUrl::new(request.token_url.clone()).map_err(|e| ProviderError::ClientSetup {
                reason: format!("invalid token url: {e}"),
            })?;

        let client = BasicClient::new(ClientId::new(request.client_id.clone()))
            .set_client_secret(ClientSecret::new(request.client_secret.clone()))
            .set_token_uri(token_url);

        let response = client
            .exchange_client_credentials()
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => ProviderError::TokenRejected {
                    reason: response.to_string(),
                },
                other => ProviderError::TokenExchange {
                    reason: other.to_string(),
                },
            })?;

        debug!("client credentials exchanged");
        Ok(AccessToken::new(response.access_token().secret().clone()))
    }
}
