//! Read access to flow definitions.
//!
//! Flow graphs and nodes are owned by the authoring system. The core resolves
//! them through [`FlowStore`] and never writes them.

use crate::error::StoreError;
use crate::model::{FlowGraph, FlowNode};
use async_trait::async_trait;
use flowhook_core::{FlowId, NodeId, OrganizationId, Result, WebhookId};
use std::collections::HashMap;
use std::sync::RwLock;

/// Lookup interface over the external flow store.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Resolves the flow bound to a public webhook.
    async fn flow_by_webhook(
        &self,
        organization_id: &OrganizationId,
        webhook_id: &WebhookId,
    ) -> Result<FlowGraph, StoreError>;

    /// Resolves a node of a flow.
    async fn node_by_id(
        &self,
        flow_id: &FlowId,
        node_id: &NodeId,
    ) -> Result<FlowNode, StoreError>;
}

/// A store held entirely in memory.
///
/// Used for local runs and tests; contents are replaced wholesale through
/// [`InMemoryFlowStore::insert_flow`] and [`InMemoryFlowStore::insert_node`].
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: RwLock<HashMap<(OrganizationId, WebhookId), FlowGraph>>,
    nodes: RwLock<HashMap<(FlowId, NodeId), FlowNode>>,
}

impl InMemoryFlowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a flow to a webhook id.
    pub fn insert_flow(&self, webhook_id: WebhookId, flow: FlowGraph) {
        let key = (flow.organization_id.clone(), webhook_id);
        if let Ok(mut flows) = self.flows.write() {
            flows.insert(key, flow);
        }
    }

    /// Adds a node to a flow.
    pub fn insert_node(&self, flow_id: FlowId, node: FlowNode) {
        let key = (flow_id, node.id.clone());
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.insert(key, node);
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::LookupFailed {
        reason: "in-memory store lock poisoned".to_string(),
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn flow_by_webhook(
        &self,
        organization_id: &OrganizationId,
        webhook_id: &WebhookId,
    ) -> Result<FlowGraph, StoreError> {
        let flows = self.flows.read().map_err(|_| poisoned())?;
        let flow = flows
            .get(&(organization_id.clone(), webhook_id.clone()))
            .cloned()
            .ok_or_else(|| StoreError::FlowNotFound {
                organization_id: organization_id.clone(),
                webhook_id: webhook_id.clone(),
            })?;
        Ok(flow)
    }

    async fn node_by_id(
        &self,
        flow_id: &FlowId,
        node_id: &NodeId,
    ) -> Result<FlowNode, StoreError> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        let node = nodes
            .get(&(flow_id.clone(), node_id.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NodeNotFound {
                flow_id: flow_id.clone(),
                node_id: node_id.clone(),
            })?;
        Ok(node)
    }
}
