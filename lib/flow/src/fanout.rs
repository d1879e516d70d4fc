//! Fan-out of derived events to child nodes.
//!
//! Children are processed one at a time in the order the node lists them.
//! Each child gets its own bus entry, and a failure for one child is recorded
//! without affecting the children after it.

use crate::bus::EventBus;
use crate::error::{BusError, StoreError};
use crate::event::{BusConfig, BusEntry, DerivedEvent};
use crate::flatten::FlatPayload;
use crate::model::{FlowGraph, FlowNode};
use crate::retry::RetryPolicy;
use crate::store::FlowStore;
use flowhook_core::NodeId;
use rootcause::Report;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Why delivery to a child did not happen.
#[derive(Debug)]
pub enum PublishFailure {
    /// The child node could not be resolved.
    Resolve(Report<StoreError>),
    /// The bus did not accept the entry.
    Publish(Report<BusError>),
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve(e) => write!(f, "child resolution failed: {e}"),
            Self::Publish(e) => write!(f, "publish failed: {e}"),
        }
    }
}

/// Outcome of delivering to one child; `Ok` carries the consumer endpoint.
pub type PublishResult = Result<String, PublishFailure>;

/// Delivery record for one child.
#[derive(Debug)]
pub struct ChildDelivery {
    /// The child node.
    pub child_id: NodeId,
    /// What happened.
    pub result: PublishResult,
}

/// Delivery records for every child, in fan-out order.
#[derive(Debug, Default)]
pub struct FanoutReport {
    /// One record per child id on the node.
    pub deliveries: Vec<ChildDelivery>,
}

impl FanoutReport {
    /// Number of children the bus accepted an entry for.
    #[must_use]
    pub fn published(&self) -> usize {
        self.deliveries.iter().filter(|d| d.result.is_ok()).count()
    }

    /// Number of children that were not delivered to.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.published()
    }
}

/// Publishes one derived event per child node.
#[derive(Clone)]
pub struct FanoutPublisher {
    store: Arc<dyn FlowStore>,
    bus: Arc<dyn EventBus>,
    config: BusConfig,
    retry: RetryPolicy,
}

impl FanoutPublisher {
    /// Creates a publisher with a single-attempt retry policy.
    pub fn new(store: Arc<dyn FlowStore>, bus: Arc<dyn EventBus>, config: BusConfig) -> Self {
        Self {
            store,
            bus,
            config,
            retry: RetryPolicy::none(),
        }
    }

    /// Sets the retry policy used for bus publishes.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Delivers `payload` to every child of `node`.
    #[instrument(skip_all, fields(flow_id = %flow.id, node_id = %node.id, children = node.children_ids.len()))]
    pub async fn fanout(
        &self,
        flow: &FlowGraph,
        node: &FlowNode,
        payload: &FlatPayload,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();

        for child_id in &node.children_ids {
            let result = self.deliver(flow, child_id, payload).await;
            match &result {
                Ok(api) => info!(child_id = %child_id, consumer_api = %api, "derived event published"),
                Err(e) => warn!(child_id = %child_id, error = %e, "derived event not delivered"),
            }
            report.deliveries.push(ChildDelivery {
                child_id: child_id.clone(),
                result,
            });
        }

        report
    }

    async fn deliver(
        &self,
        flow: &FlowGraph,
        child_id: &NodeId,
        payload: &FlatPayload,
    ) -> PublishResult {
        let child = self
            .store
            .node_by_id(&flow.id, child_id)
            .await
            .map_err(PublishFailure::Resolve)?;

        let api = child.api.clone();
        let event = DerivedEvent::for_child(&self.config, flow, child, payload.clone());
        let entry = BusEntry::new(&self.config, event);

        self.retry
            .run(|_| self.bus.publish(&entry))
            .await
            .map_err(PublishFailure::Publish)?;

        Ok(api)
    }
}
