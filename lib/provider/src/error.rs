//! Error types for the provider crate.
//!
//! - `ActionError`: Resolving what to call (settings, payload values, URIs)
//! - `ProviderError`: Talking to the provider (token exchange, HTTP)

use std::fmt;

/// Errors while preparing an action call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Per-action settings do not have the expected shape.
    InvalidSettings { action: String, reason: String },
    /// A required setting is absent.
    MissingSetting { action: String, field: &'static str },
    /// A payload key named by the settings has no usable value.
    MissingPayloadValue { action: String, key: String },
    /// The target URI could not be built or parsed.
    InvalidUri { uri: String, reason: String },
    /// Neither a private token nor client credentials are configured.
    MissingCredentials { action: String },
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSettings { action, reason } => {
                write!(f, "invalid settings for action '{action}': {reason}")
            }
            Self::MissingSetting { action, field } => {
                write!(f, "action '{action}' requires setting '{field}'")
            }
            Self::MissingPayloadValue { action, key } => {
                write!(f, "action '{action}' found no value for payload key '{key}'")
            }
            Self::InvalidUri { uri, reason } => {
                write!(f, "invalid target uri '{uri}': {reason}")
            }
            Self::MissingCredentials { action } => {
                write!(
                    f,
                    "action '{action}' has neither a private token nor client credentials"
                )
            }
        }
    }
}

impl std::error::Error for ActionError {}

/// Errors from provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The HTTP client could not be built.
    ClientSetup { reason: String },
    /// Client-credentials exchange could not be completed.
    TokenExchange { reason: String },
    /// The token endpoint refused the client credentials.
    TokenRejected { reason: String },
    /// The request could not be sent or the connection failed.
    Request { reason: String },
    /// The provider did not answer within the configured timeout.
    Timeout { url: String },
    /// The provider answered with a non-success status.
    Status { status: u16, body: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSetup { reason } => write!(f, "http client setup failed: {reason}"),
            Self::TokenExchange { reason } => write!(f, "token exchange failed: {reason}"),
            Self::TokenRejected { reason } => write!(f, "token request rejected: {reason}"),
            Self::Request { reason } => write!(f, "provider request failed: {reason}"),
            Self::Timeout { url } => write!(f, "provider request to {url} timed out"),
            Self::Status { status, body } => {
                write!(f, "provider responded with status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Whether another attempt may succeed: transport failures, timeouts,
    /// throttling and server-side statuses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TokenExchange { .. } | Self::Request { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::ClientSetup { .. } | Self::TokenRejected { .. } => false,
        }
    }
}
