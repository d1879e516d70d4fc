//! Webhook precondition checks.
//!
//! Checks run in a fixed order and the first failure stops the delivery:
//! user agent, flow lookup and pause flag, root node lookup and pause flags,
//! shared secret, event whitelist. The only side effects are the two store
//! reads.

use crate::delivery::WebhookDelivery;
use crate::error::ValidationFailure;
use flowhook_flow::{FlowGraph, FlowNode, FlowStore};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Header conventions of a webhook provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSignature {
    /// Required `User-Agent` prefix.
    pub user_agent_prefix: &'static str,
    /// Header carrying the event type.
    pub event_header: &'static str,
    /// Header carrying the shared secret.
    pub token_header: &'static str,
    /// Suffix of the payload key the event type is stored under.
    pub event_key_suffix: &'static str,
}

impl ProviderSignature {
    /// Payload key holding the event type for a node.
    #[must_use]
    pub fn event_key(&self, node_id: &str) -> String {
        format!("{node_id}_{}", self.event_key_suffix)
    }
}

/// GitLab webhooks.
pub const GITLAB: ProviderSignature = ProviderSignature {
    user_agent_prefix: "GitLab/",
    event_header: "X-Gitlab-Event",
    token_header: "X-Gitlab-Token",
    event_key_suffix: "gitlab_event",
};

/// A delivery that passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDelivery {
    /// The flow bound to the webhook.
    pub flow: FlowGraph,
    /// The flow's root node.
    pub node: FlowNode,
    /// The accepted event type.
    pub event_type: String,
}

/// Result of validating a delivery.
pub type ValidationResult = Result<ValidatedDelivery, ValidationFailure>;

/// Validates webhook deliveries against the flow store.
#[derive(Clone)]
pub struct WebhookValidator {
    store: Arc<dyn FlowStore>,
    signature: ProviderSignature,
}

impl WebhookValidator {
    /// Creates a validator for one provider.
    pub fn new(store: Arc<dyn FlowStore>, signature: ProviderSignature) -> Self {
        Self { store, signature }
    }

    /// The provider conventions this validator enforces.
    #[must_use]
    pub fn signature(&self) -> &ProviderSignature {
        &self.signature
    }

    /// Runs every check against `delivery`.
    #[instrument(skip_all, fields(
        organization_id = %delivery.organization_id,
        webhook_id = %delivery.webhook_id,
    ))]
    pub async fn validate(&self, delivery: &WebhookDelivery) -> ValidationResult {
        let headers = &delivery.headers;

        let user_agent = headers.get("User-Agent");
        if !user_agent.is_some_and(|ua| ua.starts_with(self.signature.user_agent_prefix)) {
            return Err(ValidationFailure::InvalidUserAgent {
                user_agent: user_agent.map(str::to_string),
            });
        }

        let flow = self
            .store
            .flow_by_webhook(&delivery.organization_id, &delivery.webhook_id)
            .await
            .map_err(|e| ValidationFailure::FlowNotFound {
                reason: e.to_string(),
            })?;
        if !flow.is_active() {
            return Err(ValidationFailure::FlowInactive { flow_id: flow.id });
        }

        let node = self
            .store
            .node_by_id(&flow.id, &flow.parent_node_id)
            .await
            .map_err(|e| ValidationFailure::NodeNotFound {
                reason: e.to_string(),
            })?;
        if !node.is_active() {
            return Err(ValidationFailure::NodeInactive { node_id: node.id });
        }

        let expected = node.meta.header(self.signature.token_header);
        let presented = headers.get(self.signature.token_header);
        match (expected, presented) {
            (Some(expected), Some(presented)) if secrets_match(expected, presented) => {}
            _ => return Err(ValidationFailure::Unauthorized { node_id: node.id }),
        }

        let event = headers.get(self.signature.event_header);
        let event_type = match event {
            Some(event) if node.has_action(event) => event.to_string(),
            _ => {
                return Err(ValidationFailure::UnsupportedEvent {
                    event: event.map(str::to_string),
                });
            }
        };

        debug!(flow_id = %flow.id, node_id = %node.id, %event_type, "delivery accepted");
        Ok(ValidatedDelivery {
            flow,
            node,
            event_type,
        })
    }
}

/// Compares a configured secret with a presented one in time independent of
/// where they differ. An empty configured secret matches nothing.
fn secrets_match(expected: &str, presented: &str) -> bool {
    !expected.is_empty() && constant_time_eq(expected.as_bytes(), presented.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}
