//! Provider actions for flowhook nodes.
//!
//! This crate provides:
//!
//! - **Action table**: Closed set of provider operations keyed by action name
//! - **Strategies**: Target URI, credential and body resolution per action
//! - **Token issuer**: OAuth 2.0 client-credentials exchange
//! - **HTTP primitive**: One authenticated call against a provider API
//! - **Dispatcher**: Runs a node's actions in order, isolating failures

pub mod action;
pub mod bitbucket;
pub mod dispatcher;
pub mod error;
pub mod gitlab;
pub mod http;
pub mod token;

pub use action::{ActionContext, ActionKind, ActionStrategy, Credentials, PreparedCall};
pub use dispatcher::{ActionDispatcher, ActionFailure, ActionOutcome, ActionResult, DispatchReport};
pub use error::{ActionError, ProviderError};
pub use http::{ProviderHttp, ProviderRequest, ProviderResponse, ReqwestProviderHttp};
pub use token::{AccessToken, ClientCredentialsRequest, OAuthTokenIssuer, TokenIssuer};
