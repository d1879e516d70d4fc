//! Inbound messages accepted by the pipeline.

use flowhook_core::{OrganizationId, WebhookId};
use flowhook_flow::{DerivedEvent, FlatPayload, FlowNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request headers with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryHeaders(BTreeMap<String, String>);

impl DeliveryHeaders {
    /// Creates an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header, replacing any previous value under the same name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Adds a header, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns a header value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for DeliveryHeaders {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// A public webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookDelivery {
    /// Organization from the request path.
    pub organization_id: OrganizationId,
    /// Webhook from the request path.
    pub webhook_id: WebhookId,
    /// Request headers.
    pub headers: DeliveryHeaders,
    /// Raw request body.
    pub body: Vec<u8>,
}

/// An internally dispatched action event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Event detail.
    pub detail: ActionDetail,
}

/// The node to act as and the payload to act on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDetail {
    /// The receiving node.
    pub node_detail: FlowNode,
    /// Payload flattened by the upstream webhook.
    #[serde(default)]
    pub flatten_data: FlatPayload,
}

impl From<DerivedEvent> for ActionEvent {
    fn from(event: DerivedEvent) -> Self {
        Self {
            detail: ActionDetail {
                node_detail: event.node_detail,
                flatten_data: event.flatten_data,
            },
        }
    }
}
