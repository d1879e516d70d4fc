//! Error types for the flow crate.
//!
//! Errors are returned wrapped in a rootcause `Report`:
//! - `StoreError`: Flow and node lookups against the external store
//! - `BusError`: Publishing derived events to the event bus
//! - `EnvelopeError`: Reading entries back off the bus

use flowhook_core::{FlowId, NodeId, OrganizationId, WebhookId};
use std::fmt;

/// Errors from flow store lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No flow is bound to the webhook.
    FlowNotFound {
        organization_id: OrganizationId,
        webhook_id: WebhookId,
    },
    /// Node does not exist in the flow.
    NodeNotFound { flow_id: FlowId, node_id: NodeId },
    /// The store could not be reached or the query failed.
    LookupFailed { reason: String },
    /// A stored document could not be decoded.
    InvalidDocument { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlowNotFound {
                organization_id,
                webhook_id,
            } => {
                write!(
                    f,
                    "no flow for webhook {webhook_id} in organization {organization_id}"
                )
            }
            Self::NodeNotFound { flow_id, node_id } => {
                write!(f, "node {node_id} not found in flow {flow_id}")
            }
            Self::LookupFailed { reason } => write!(f, "flow store lookup failed: {reason}"),
            Self::InvalidDocument { reason } => {
                write!(f, "invalid flow document: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from event bus operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Failed to connect to the bus.
    ConnectionFailed { message: String },
    /// Failed to encode the entry.
    Serialization { message: String },
    /// The bus rejected or did not acknowledge the entry.
    PublishFailed { message: String },
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => {
                write!(f, "event bus connection failed: {message}")
            }
            Self::Serialization { message } => {
                write!(f, "failed to serialize bus entry: {message}")
            }
            Self::PublishFailed { message } => write!(f, "event publish failed: {message}"),
        }
    }
}

impl std::error::Error for BusError {}

/// Errors reading a bus entry's envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Not an envelope, or the payload does not match its version's shape.
    Malformed { reason: String },
    /// Written in a version this build cannot read.
    UnsupportedVersion { version: u32 },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed envelope: {reason}"),
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported envelope version {version}")
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}
