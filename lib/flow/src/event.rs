//! Derived events sent from a node to its children.

use crate::flatten::FlatPayload;
use crate::model::{FlowGraph, FlowNode};
use flowhook_core::{FlowId, OrganizationId};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Event-bus addressing and event metadata.
///
/// Passed to the fan-out publisher at construction instead of being read from
/// the process environment on every publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Target event bus identifier.
    #[serde(default = "default_event_bus_name")]
    pub event_bus_name: String,
    /// Value of the `event` field.
    #[serde(default = "default_event_name")]
    pub event_name: String,
    /// Value of the `eventSource` field.
    #[serde(default = "default_event_source")]
    pub event_source: String,
    /// Value of the `eventVersion` field.
    #[serde(default = "default_event_version")]
    pub event_version: String,
    /// Detail type attached to every bus entry.
    #[serde(default = "default_detail_type")]
    pub detail_type: String,
    /// Source tag attached to every bus entry.
    #[serde(default = "default_source")]
    pub source: String,
    /// Namespace used in resource identifiers.
    #[serde(default = "default_resource_namespace")]
    pub resource_namespace: String,
}

fn default_event_bus_name() -> String {
    "FLOWHOOK_EVENTS".to_string()
}

fn default_event_name() -> String {
    "flowhook.hooks".to_string()
}

fn default_event_source() -> String {
    "hooks.flowhook.io".to_string()
}

fn default_event_version() -> String {
    "1.0".to_string()
}

fn default_detail_type() -> String {
    "flowhook".to_string()
}

fn default_source() -> String {
    "flowhook.flows".to_string()
}

fn default_resource_namespace() -> String {
    "flowhook".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            event_bus_name: default_event_bus_name(),
            event_name: default_event_name(),
            event_source: default_event_source(),
            event_version: default_event_version(),
            detail_type: default_detail_type(),
            source: default_source(),
            resource_namespace: default_resource_namespace(),
        }
    }
}

impl BusConfig {
    /// Returns the resource identifier for a flow.
    #[must_use]
    pub fn resource(&self, organization_id: &OrganizationId, flow_id: &FlowId) -> String {
        format!(
            "orn:{}:{organization_id}:flows/{flow_id}",
            self.resource_namespace
        )
    }
}

/// The event delivered to one child node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedEvent {
    /// Event name.
    pub event: String,
    /// Event source.
    pub event_source: String,
    /// Event schema version.
    pub event_version: String,
    /// Consumer endpoint of the child.
    #[serde(rename = "consumerAPI")]
    pub consumer_api: String,
    /// Organization owning the flow.
    pub organization_id: OrganizationId,
    /// Flow the child belongs to.
    pub flow_id: FlowId,
    /// Full child node record.
    pub node_detail: FlowNode,
    /// Payload flattened by the upstream node.
    pub flatten_data: FlatPayload,
}

impl DerivedEvent {
    /// Builds the event addressed to `child`.
    #[must_use]
    pub fn for_child(
        config: &BusConfig,
        flow: &FlowGraph,
        child: FlowNode,
        payload: FlatPayload,
    ) -> Self {
        Self {
            event: config.event_name.clone(),
            event_source: config.event_source.clone(),
            event_version: config.event_version.clone(),
            consumer_api: child.api.clone(),
            organization_id: flow.organization_id.clone(),
            flow_id: flow.id.clone(),
            node_detail: child,
            flatten_data: payload,
        }
    }
}

/// One entry handed to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEntry {
    /// Unique id of this entry, fixed when the entry is built.
    ///
    /// Every publish attempt of the same entry carries the same id, so the
    /// bus can drop duplicates left by a retried publish.
    #[serde(default)]
    pub id: String,
    /// The derived event.
    pub detail: DerivedEvent,
    /// Detail type tag.
    pub detail_type: String,
    /// Target bus.
    pub event_bus_name: String,
    /// Resource identifiers the event concerns.
    pub resources: Vec<String>,
    /// Source tag.
    pub source: String,
}

impl BusEntry {
    /// Wraps a derived event with the configured routing metadata.
    #[must_use]
    pub fn new(config: &BusConfig, detail: DerivedEvent) -> Self {
        let resource = config.resource(&detail.organization_id, &detail.flow_id);
        Self {
            id: Ulid::new().to_string(),
            detail,
            detail_type: config.detail_type.clone(),
            event_bus_name: config.event_bus_name.clone(),
            resources: vec![resource],
            source: config.source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> DerivedEvent {
        let flow = FlowGraph::new("flow-1".into(), "org-1".into(), "root".into());
        let child = FlowNode::new("child-1").with_api("gitlabV4Handler");
        let mut payload = FlatPayload::new();
        payload.insert("root_gitlab_event", "push");
        DerivedEvent::for_child(&BusConfig::default(), &flow, child, payload)
    }

    #[test]
    fn derived_event_wire_format() {
        let json = serde_json::to_value(sample_event()).expect("serialize");

        assert_eq!(json["event"], json!("flowhook.hooks"));
        assert_eq!(json["eventSource"], json!("hooks.flowhook.io"));
        assert_eq!(json["eventVersion"], json!("1.0"));
        assert_eq!(json["consumerAPI"], json!("gitlabV4Handler"));
        assert_eq!(json["organizationId"], json!("org-1"));
        assert_eq!(json["flowId"], json!("flow-1"));
        assert_eq!(json["nodeDetail"]["id"], json!("child-1"));
        assert_eq!(json["flattenData"]["root_gitlab_event"], json!("push"));
    }

    #[test]
    fn bus_entry_routing() {
        let entry = BusEntry::new(&BusConfig::default(), sample_event());

        assert_eq!(entry.resources, vec!["orn:flowhook:org-1:flows/flow-1"]);
        assert_eq!(entry.source, "flowhook.flows");
        assert_eq!(entry.detail_type, "flowhook");
        assert_eq!(entry.event_bus_name, "FLOWHOOK_EVENTS");
    }

    #[test]
    fn every_entry_gets_its_own_id() {
        let first = BusEntry::new(&BusConfig::default(), sample_event());
        let second = BusEntry::new(&BusConfig::default(), sample_event());

        assert!(Ulid::from_string(&first.id).is_ok());
        assert_ne!(first.id, second.id);
        assert_eq!(first.clone().id, first.id);
    }

    #[test]
    fn bus_config_fills_missing_fields() {
        let config: BusConfig =
            serde_json::from_value(json!({"event_bus_name": "OTHER"})).expect("deserialize");
        assert_eq!(config.event_bus_name, "OTHER");
        assert_eq!(config.event_version, "1.0");
    }
}
