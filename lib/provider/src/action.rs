//! The closed set of provider actions.
//!
//! Action names on a node are looked up in [`ACTIONS`]. Each kind has a
//! strategy that knows where its provider lives and how the target path is
//! built. Everything here is pure: the dispatcher performs the token
//! exchange and the call.

use crate::bitbucket::DeclinePullRequest;
use crate::error::ActionError;
use crate::gitlab::CloseMergeRequest;
use crate::token::{AccessToken, ClientCredentialsRequest};
use flowhook_flow::{ActionMeta, FlatPayload, FlowNode};
use reqwest::{Method, Url};
use serde_json::Value as JsonValue;

/// Action names and the kinds they select.
pub const ACTIONS: &[(&str, ActionKind)] = &[
    ("declinePullRequest", ActionKind::DeclinePullRequest),
    ("closeMergeRequest", ActionKind::CloseMergeRequest),
];

/// A provider operation a node can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Decline a Bitbucket pull request.
    DeclinePullRequest,
    /// Close a GitLab merge request.
    CloseMergeRequest,
}

impl ActionKind {
    /// Looks up an action name; unknown names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        ACTIONS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kind)| *kind)
    }

    /// Returns the action name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DeclinePullRequest => "declinePullRequest",
            Self::CloseMergeRequest => "closeMergeRequest",
        }
    }

    /// Returns the strategy implementing this action.
    #[must_use]
    pub fn strategy(self) -> &'static dyn ActionStrategy {
        match self {
            Self::DeclinePullRequest => &DeclinePullRequest,
            Self::CloseMergeRequest => &CloseMergeRequest,
        }
    }
}

/// Everything a strategy may read while preparing a call.
#[derive(Debug)]
pub struct ActionContext<'a> {
    /// The action name as listed on the node.
    pub action: &'a str,
    /// The node performing the action.
    pub node: &'a FlowNode,
    /// Settings stored under the action name.
    pub settings: ActionMeta,
    /// Payload flattened by the upstream webhook.
    pub payload: &'a FlatPayload,
}

impl<'a> ActionContext<'a> {
    /// Builds the context, reading the action's settings from the node.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored settings are malformed.
    pub fn new(
        action: &'a str,
        node: &'a FlowNode,
        payload: &'a FlatPayload,
    ) -> Result<Self, ActionError> {
        let settings = node
            .meta
            .action(action)
            .map_err(|e| ActionError::InvalidSettings {
                action: action.to_string(),
                reason: e.to_string(),
            })?
            .unwrap_or_default();
        Ok(Self {
            action,
            node,
            settings,
            payload,
        })
    }

    /// Returns a node-level setting or a `MissingSetting` error.
    ///
    /// # Errors
    ///
    /// Returns an error if the setting is absent or empty.
    pub fn require_setting<'s>(
        &self,
        value: &'s Option<String>,
        field: &'static str,
    ) -> Result<&'s str, ActionError> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ActionError::MissingSetting {
                action: self.action.to_string(),
                field,
            })
    }

    /// Resolves a payload reference stored in the action's settings.
    ///
    /// `reference` is the settings field naming the payload key.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is not configured or the payload has
    /// no usable value under it.
    pub fn payload_value(
        &self,
        reference: &Option<String>,
        field: &'static str,
    ) -> Result<String, ActionError> {
        let key = self.require_setting(reference, field)?;
        self.payload
            .get_text(key)
            .ok_or_else(|| ActionError::MissingPayloadValue {
                action: self.action.to_string(),
                key: key.to_string(),
            })
    }
}

/// How the access token for a call is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A token configured on the node.
    Static(AccessToken),
    /// A token minted by a client-credentials exchange.
    ClientCredentials(ClientCredentialsRequest),
}

/// A fully resolved call, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Where the token comes from.
    pub credentials: Credentials,
    /// JSON body, if any.
    pub body: Option<JsonValue>,
}

/// Provider-specific behavior of an action.
pub trait ActionStrategy: Send + Sync {
    /// HTTP method of the call.
    fn method(&self) -> Method;

    /// API base URL used when the node sets no `baseUrl`.
    fn default_base_url(&self) -> &'static str;

    /// Token endpoint used when the node sets no `tokenUrl`.
    fn default_token_url(&self) -> &'static str;

    /// Builds the target URL from provider path segments.
    ///
    /// # Errors
    ///
    /// Returns an error if a required setting or payload value is missing.
    fn target(&self, ctx: &ActionContext<'_>, base_url: &str) -> Result<Url, ActionError>;

    /// Body sent when the action's settings define none.
    fn default_body(&self) -> Option<JsonValue> {
        None
    }

    /// Whether the node's `baseUrl` and `tokenUrl` apply to this action.
    ///
    /// Only self-hostable providers honor them; others always use their
    /// fixed endpoints.
    fn accepts_node_endpoints(&self) -> bool {
        false
    }

    /// Resolves a node-level endpoint override, if this action accepts one.
    fn node_endpoint<'a>(&self, value: &'a Option<String>) -> Option<&'a str> {
        value
            .as_deref()
            .filter(|v| self.accepts_node_endpoints() && !v.is_empty())
    }

    /// Resolves the complete call.
    ///
    /// An explicit URI found in the payload under the `uriRef` key takes
    /// precedence over the constructed one.
    ///
    /// # Errors
    ///
    /// Returns an error if the target or the credentials cannot be resolved.
    fn prepare(&self, ctx: &ActionContext<'_>) -> Result<PreparedCall, ActionError> {
        let explicit = ctx
            .settings
            .uri_ref
            .as_deref()
            .and_then(|key| ctx.payload.get_text(key));

        let url = match explicit {
            Some(uri) => Url::parse(&uri).map_err(|e| ActionError::InvalidUri {
                uri,
                reason: e.to_string(),
            })?,
            None => {
                let base_url = self
                    .node_endpoint(&ctx.node.meta.base_url)
                    .unwrap_or(self.default_base_url());
                self.target(ctx, base_url)?
            }
        };

        let token_url = self
            .node_endpoint(&ctx.node.meta.token_url)
            .unwrap_or(self.default_token_url());

        Ok(PreparedCall {
            method: self.method(),
            url,
            credentials: credentials(ctx, token_url)?,
            body: ctx.settings.body.clone().or_else(|| self.default_body()),
        })
    }
}

/// Picks the node's private token, falling back to client credentials.
fn credentials(ctx: &ActionContext<'_>, token_url: &str) -> Result<Credentials, ActionError> {
    let meta = &ctx.node.meta;
    if let Some(token) = meta.private_token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Credentials::Static(AccessToken::new(token)));
    }

    match (meta.client_id.as_deref(), meta.client_secret.as_deref()) {
        (Some(client_id), Some(client_secret)) if !client_id.is_empty() => {
            Ok(Credentials::ClientCredentials(ClientCredentialsRequest {
                token_url: token_url.to_string(),
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            }))
        }
        _ => Err(ActionError::MissingCredentials {
            action: ctx.action.to_string(),
        }),
    }
}

/// Appends path segments to a base URL, percent-encoding each segment.
///
/// # Errors
///
/// Returns an error if `base` is not a valid hierarchical URL.
pub fn join_segments(base: &str, segments: &[&str]) -> Result<Url, ActionError> {
    let invalid = |reason: String| ActionError::InvalidUri {
        uri: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("url cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
