//! PostgreSQL-backed flow store.

use async_trait::async_trait;
use flowhook_core::{FlowId, NodeId, OrganizationId, WebhookId};
use flowhook_flow::{FlowGraph, FlowNode, FlowStore, StoreError};
use rootcause::Report;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use tracing::instrument;

/// Row type for flow queries.
#[derive(FromRow)]
struct FlowRow {
    id: String,
    organization_id: String,
    webhook_id: String,
    detail: JsonValue,
}

impl FlowRow {
    /// Decodes the stored document; key columns take precedence over the
    /// matching document fields.
    fn try_into_flow(self) -> Result<FlowGraph, StoreError> {
        decode_document(
            self.detail,
            &[
                ("id", self.id),
                ("organizationId", self.organization_id),
                ("webhookId", self.webhook_id),
            ],
        )
    }
}

/// Row type for node queries.
#[derive(FromRow)]
struct NodeRow {
    flow_id: String,
    id: String,
    detail: JsonValue,
}

impl NodeRow {
    fn try_into_node(self) -> Result<FlowNode, StoreError> {
        decode_document(self.detail, &[("id", self.id), ("flowId", self.flow_id)])
    }
}

fn decode_document<T: DeserializeOwned>(
    mut detail: JsonValue,
    keys: &[(&str, String)],
) -> Result<T, StoreError> {
    let JsonValue::Object(fields) = &mut detail else {
        return Err(StoreError::InvalidDocument {
            reason: "detail is not a JSON object".to_string(),
        });
    };
    for (name, value) in keys {
        fields.insert((*name).to_string(), JsonValue::String(value.clone()));
    }

    serde_json::from_value(detail).map_err(|e| StoreError::InvalidDocument {
        reason: e.to_string(),
    })
}

fn lookup_failed(e: sqlx::Error) -> StoreError {
    StoreError::LookupFailed {
        reason: e.to_string(),
    }
}

/// [`FlowStore`] reading the `flows` and `flow_nodes` tables.
#[derive(Clone)]
pub struct PgFlowStore {
    pool: PgPool,
}

impl PgFlowStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlowStore for PgFlowStore {
    #[instrument(skip(self))]
    async fn flow_by_webhook(
        &self,
        organization_id: &OrganizationId,
        webhook_id: &WebhookId,
    ) -> Result<FlowGraph, Report<StoreError>> {
        let row: Option<FlowRow> = sqlx::query_as(
            r#"
            SELECT id, organization_id, webhook_id, detail
            FROM flows
            WHERE organization_id = $1 AND webhook_id = $2
            "#,
        )
        .bind(organization_id.as_str())
        .bind(webhook_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(lookup_failed)?;

        let row = row.ok_or_else(|| StoreError::FlowNotFound {
            organization_id: organization_id.clone(),
            webhook_id: webhook_id.clone(),
        })?;
        Ok(row.try_into_flow()?)
    }

    #[instrument(skip(self))]
    async fn node_by_id(
        &self,
        flow_id: &FlowId,
        node_id: &NodeId,
    ) -> Result<FlowNode, Report<StoreError>> {
        let row: Option<NodeRow> = sqlx::query_as(
            r#"
            SELECT flow_id, id, detail
            FROM flow_nodes
            WHERE flow_id = $1 AND id = $2
            "#,
        )
        .bind(flow_id.as_str())
        .bind(node_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(lookup_failed)?;

        let row = row.ok_or_else(|| StoreError::NodeNotFound {
            flow_id: flow_id.clone(),
            node_id: node_id.clone(),
        })?;
        Ok(row.try_into_node()?)
    }
}
