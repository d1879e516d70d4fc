//! Flow graph and node records.
//!
//! These mirror the documents kept by the external authoring system. The core
//! only reads them, so every type keeps the fields it does not understand in
//! an `extra` map and writes them back out untouched when a node is forwarded
//! to its children.

use flowhook_core::{FlowId, NodeId, OrganizationId, WebhookId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Treats an explicit `null` the same as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An automation graph configured by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowGraph {
    /// Flow identifier.
    pub id: FlowId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// The root node that receives webhook deliveries.
    pub parent_node_id: NodeId,
    /// Pause switch for the whole graph.
    #[serde(default, deserialize_with = "nullable")]
    pub paused: bool,
    /// Webhook identifier bound to this flow, if the store exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<WebhookId>,
    /// Fields owned by the authoring system.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl FlowGraph {
    /// Creates an active flow rooted at the given node.
    #[must_use]
    pub fn new(id: FlowId, organization_id: OrganizationId, parent_node_id: NodeId) -> Self {
        Self {
            id,
            organization_id,
            parent_node_id,
            paused: false,
            webhook_id: None,
            extra: Map::new(),
        }
    }

    /// Returns true unless the graph is paused.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.paused
    }
}

/// One step in a flow graph.
///
/// `actions` plays two roles: on the root node it lists the webhook event
/// types the flow accepts, on every other node it lists the provider
/// operations the node performs when a derived event reaches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    /// Node identifier.
    pub id: NodeId,
    /// Flow this node belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<FlowId>,
    /// Pause switch for this node.
    #[serde(default, deserialize_with = "nullable")]
    pub paused: bool,
    /// Pause inherited from an ancestor.
    #[serde(default, deserialize_with = "nullable")]
    pub root_paused: bool,
    /// Ordered action names (or accepted event types on the root).
    #[serde(default, deserialize_with = "nullable")]
    pub actions: Vec<String>,
    /// Provider and per-action configuration.
    #[serde(default, deserialize_with = "nullable")]
    pub meta: NodeMeta,
    /// Ordered child node identifiers.
    #[serde(default, deserialize_with = "nullable")]
    pub children_ids: Vec<NodeId>,
    /// Parent node, absent on the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<NodeId>,
    /// Consumer endpoint invoked when this node receives a derived event.
    #[serde(default, deserialize_with = "nullable")]
    pub api: String,
    /// Fields owned by the authoring system.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl FlowNode {
    /// Creates an active node with no actions, children or configuration.
    #[must_use]
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            flow_id: None,
            paused: false,
            root_paused: false,
            actions: Vec::new(),
            meta: NodeMeta::default(),
            children_ids: Vec::new(),
            parent_node_id: None,
            api: String::new(),
            extra: Map::new(),
        }
    }

    /// Sets the consumer endpoint.
    #[must_use]
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = api.into();
        self
    }

    /// Appends an action name.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Appends a child node.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<NodeId>) -> Self {
        self.children_ids.push(child.into());
        self
    }

    /// Replaces the node configuration.
    #[must_use]
    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Returns true unless the node or one of its ancestors is paused.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !(self.paused || self.root_paused)
    }

    /// Returns true if `action` is listed on this node.
    #[must_use]
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

/// Node configuration.
///
/// Provider settings are shared by every action on the node. Per-action
/// settings live under a key equal to the action name and are read with
/// [`NodeMeta::action`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    /// Bitbucket workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Bitbucket repository slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_slug: Option<String>,
    /// OAuth client id for the client-credentials grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OAuth client secret for the client-credentials grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Statically configured access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_token: Option<String>,
    /// Provider API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// OAuth token endpoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    /// Headers an inbound webhook delivery must carry.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Per-action settings and anything else the authoring system stores.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl NodeMeta {
    /// Looks up an expected webhook header, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Reads the settings stored under an action name.
    ///
    /// Returns `Ok(None)` when the action has no settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored settings do not have the expected shape.
    pub fn action(&self, name: &str) -> Result<Option<ActionMeta>, serde_json::Error> {
        match self.extra.get(name) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some),
        }
    }

    /// Stores settings under an action name.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings' `body` cannot be represented as JSON.
    pub fn set_action(
        &mut self,
        name: impl Into<String>,
        meta: &ActionMeta,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(meta)?;
        self.extra.insert(name.into(), value);
        Ok(())
    }
}

/// Settings for a single action.
///
/// Reference fields name keys in the flattened payload rather than holding
/// values, because the values come from the webhook that started the flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    /// Payload key holding an explicit target URI.
    #[serde(
        default,
        alias = "declineRef",
        alias = "closeRef",
        skip_serializing_if = "Option::is_none"
    )]
    pub uri_ref: Option<String>,
    /// Payload key holding the pull request id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_id: Option<String>,
    /// Payload key holding the project id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Payload key holding the merge request iid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_request_id: Option<String>,
    /// Request body sent with the provider call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,
}
