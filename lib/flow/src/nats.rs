//! NATS JetStream event bus.
//!
//! Derived events are published to subjects like
//! `<prefix>.<organization_id>.<flow_id>` on a stream named after the
//! configured event bus. Each entry is wrapped in a versioned envelope and
//! carries its id as `Nats-Msg-Id`, so JetStream drops the duplicates a
//! retried publish can leave behind.

use crate::bus::EventBus;
use crate::envelope;
use crate::error::BusError;
use crate::event::BusEntry;
use async_nats::jetstream;
use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default subject prefix for derived events.
const EVENTS_SUBJECT_PREFIX: &str = "flowhook.events";

/// Header JetStream uses for publish deduplication.
const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// Configuration for the NATS event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Subject prefix (defaults to `flowhook.events`).
    #[serde(default)]
    pub subject_prefix: Option<String>,
}

fn default_url() -> String {
    "nats://localhost:4222".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self::new(default_url())
    }
}

impl NatsConfig {
    /// Creates a new config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: None,
        }
    }

    /// Returns the subject prefix.
    #[must_use]
    pub fn subject_prefix(&self) -> &str {
        self.subject_prefix
            .as_deref()
            .unwrap_or(EVENTS_SUBJECT_PREFIX)
    }

    /// Returns the wildcard subject covering every derived event.
    #[must_use]
    pub fn all_subjects(&self) -> String {
        format!("{}.>", self.subject_prefix())
    }

    /// Returns the subject for an entry.
    #[must_use]
    pub fn subject_for(&self, entry: &BusEntry) -> String {
        format!(
            "{}.{}.{}",
            self.subject_prefix(),
            subject_token(entry.detail.organization_id.as_str()),
            subject_token(entry.detail.flow_id.as_str()),
        )
    }
}

/// Headers sent with an entry.
fn headers_for(entry: &BusEntry) -> async_nats::HeaderMap {
    let mut headers = async_nats::HeaderMap::new();
    headers.insert(MSG_ID_HEADER, entry.id.as_str());
    headers
}

/// Replaces characters that carry meaning in NATS subjects.
fn subject_token(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' | '\t' => '_',
            other => other,
        })
        .collect()
}

/// JetStream-backed [`EventBus`].
pub struct NatsEventBus {
    jetstream: Arc<jetstream::Context>,
    config: NatsConfig,
    stream_name: String,
}

impl NatsEventBus {
    /// Connects to NATS and ensures the stream exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn connect(
        config: NatsConfig,
        stream_name: impl Into<String>,
    ) -> Result<Self, Report<BusError>> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| BusError::ConnectionFailed {
                message: e.to_string(),
            })?;

        let jetstream = jetstream::new(client);
        let stream_name = stream_name.into();

        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: stream_name.clone(),
                subjects: vec![config.all_subjects()],
                storage: jetstream::stream::StorageType::File,
                retention: jetstream::stream::RetentionPolicy::Limits,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::ConnectionFailed {
                message: format!("failed to create stream {stream_name}: {e}"),
            })?;

        Ok(Self {
            jetstream: Arc::new(jetstream),
            config,
            stream_name,
        })
    }

    /// Returns the JetStream context, for consumers sharing the connection.
    #[must_use]
    pub fn jetstream(&self) -> Arc<jetstream::Context> {
        Arc::clone(&self.jetstream)
    }

    /// Returns the stream name.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    #[instrument(skip_all, fields(flow_id = %entry.detail.flow_id, consumer_api = %entry.detail.consumer_api))]
    async fn publish(&self, entry: &BusEntry) -> Result<(), Report<BusError>> {
        let subject = self.config.subject_for(entry);
        let bytes = envelope::encode(entry).map_err(|e| BusError::Serialization {
            message: e.to_string(),
        })?;

        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), headers_for(entry), bytes.into())
            .await
            .map_err(|e| BusError::PublishFailed {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| BusError::PublishFailed {
                message: e.to_string(),
            })?;

        debug!(%subject, msg_id = %entry.id, sequence = ack.sequence, "entry acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BusConfig, DerivedEvent};
    use crate::flatten::FlatPayload;
    use crate::model::{FlowGraph, FlowNode};

    fn entry(org: &str, flow: &str) -> BusEntry {
        let graph = FlowGraph::new(flow.into(), org.into(), "root".into());
        let event = DerivedEvent::for_child(
            &BusConfig::default(),
            &graph,
            FlowNode::new("child"),
            FlatPayload::new(),
        );
        BusEntry::new(&BusConfig::default(), event)
    }

    #[test]
    fn nats_config_defaults() {
        let config = NatsConfig::new("nats://localhost:4222");
        assert_eq!(config.subject_prefix(), EVENTS_SUBJECT_PREFIX);
        assert_eq!(config.all_subjects(), "flowhook.events.>");
    }

    #[test]
    fn subject_per_flow() {
        let config = NatsConfig::default();
        assert_eq!(
            config.subject_for(&entry("org-1", "flow-1")),
            "flowhook.events.org-1.flow-1"
        );
    }

    #[test]
    fn message_id_is_the_entry_id() {
        let entry = entry("org-1", "flow-1");
        let headers = headers_for(&entry);

        assert_eq!(
            headers.get(MSG_ID_HEADER).map(|v| v.as_str()),
            Some(entry.id.as_str())
        );
        assert_eq!(headers_for(&entry.clone()).get(MSG_ID_HEADER), headers.get(MSG_ID_HEADER));
    }

    #[test]
    fn subject_tokens_are_sanitized() {
        let config = NatsConfig {
            url: default_url(),
            subject_prefix: Some("custom".to_string()),
        };
        assert_eq!(
            config.subject_for(&entry("acme.io", "flow *1")),
            "custom.acme_io.flow__1"
        );
    }
}
