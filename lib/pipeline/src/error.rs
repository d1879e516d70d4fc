//! Precondition failures for webhook deliveries.

use flowhook_core::{FlowId, NodeId};
use std::fmt;

/// Why a webhook delivery was rejected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// The user agent does not identify the provider.
    InvalidUserAgent { user_agent: Option<String> },
    /// No flow could be resolved for the webhook.
    FlowNotFound { reason: String },
    /// The flow is paused.
    FlowInactive { flow_id: FlowId },
    /// The root node could not be resolved.
    NodeNotFound { reason: String },
    /// The root node is paused.
    NodeInactive { node_id: NodeId },
    /// The shared secret is missing or does not match.
    Unauthorized { node_id: NodeId },
    /// The event type is not accepted by the root node.
    UnsupportedEvent { event: Option<String> },
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUserAgent { user_agent } => {
                write!(f, "invalid user agent: {}", user_agent.as_deref().unwrap_or("<none>"))
            }
            Self::FlowNotFound { reason } => write!(f, "flow not found: {reason}"),
            Self::FlowInactive { flow_id } => write!(f, "flow {flow_id} is paused"),
            Self::NodeNotFound { reason } => write!(f, "root node not found: {reason}"),
            Self::NodeInactive { node_id } => write!(f, "node {node_id} is paused"),
            Self::Unauthorized { node_id } => {
                write!(f, "secret token mismatch for node {node_id}")
            }
            Self::UnsupportedEvent { event } => {
                write!(f, "unsupported event: {}", event.as_deref().unwrap_or("<none>"))
            }
        }
    }
}

impl std::error::Error for ValidationFailure {}

impl ValidationFailure {
    /// Short machine-readable name, used as a log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUserAgent { .. } => "invalid_user_agent",
            Self::FlowNotFound { .. } => "flow_not_found",
            Self::FlowInactive { .. } => "flow_inactive",
            Self::NodeNotFound { .. } => "node_not_found",
            Self::NodeInactive { .. } => "node_inactive",
            Self::Unauthorized { .. } => "unauthorized",
            Self::UnsupportedEvent { .. } => "unsupported_event",
        }
    }
}
