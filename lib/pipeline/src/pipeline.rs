//! The two entry points of the service.
//!
//! The webhook entry validates a public delivery, flattens its JSON body under
//! the root node's id and fans the result out to the root's children. The
//! action entry runs the provider actions of a node that received a derived
//! event. Both entries log their outcome and return it as a value; callers
//! acknowledge the delivery whatever the outcome.

use crate::delivery::{ActionEvent, WebhookDelivery};
use crate::error::ValidationFailure;
use crate::validate::{ValidatedDelivery, WebhookValidator};
use flowhook_core::{FlowId, NodeId};
use flowhook_flow::{FanoutPublisher, FanoutReport, flatten};
use flowhook_provider::{ActionDispatcher, DispatchReport};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

/// What happened to a webhook delivery.
#[derive(Debug)]
pub enum WebhookOutcome {
    /// A precondition failed; nothing was flattened or published.
    Rejected(ValidationFailure),
    /// The body is not JSON.
    Malformed { reason: String },
    /// The payload was fanned out to the root's children.
    Propagated {
        flow_id: FlowId,
        node_id: NodeId,
        event_type: String,
        fields: usize,
        report: FanoutReport,
    },
}

/// What happened to an action event.
#[derive(Debug)]
pub enum ActionEventOutcome {
    /// The node is paused; no action ran.
    Inactive { node_id: NodeId },
    /// The node's actions ran.
    Dispatched(DispatchReport),
}

/// Orchestrates validation, flattening, fan-out and action dispatch.
#[derive(Clone)]
pub struct HandlerPipeline {
    validator: WebhookValidator,
    fanout: FanoutPublisher,
    dispatcher: ActionDispatcher,
}

impl HandlerPipeline {
    /// Creates a pipeline from its stages.
    pub fn new(
        validator: WebhookValidator,
        fanout: FanoutPublisher,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self {
            validator,
            fanout,
            dispatcher,
        }
    }

    /// Handles a public webhook delivery.
    #[instrument(skip_all, fields(
        organization_id = %delivery.organization_id,
        webhook_id = %delivery.webhook_id,
    ))]
    pub async fn handle_webhook(&self, delivery: &WebhookDelivery) -> WebhookOutcome {
        let ValidatedDelivery {
            flow,
            node,
            event_type,
        } = match self.validator.validate(delivery).await {
            Ok(validated) => validated,
            Err(failure) => {
                warn!(kind = failure.kind(), error = %failure, "webhook rejected");
                return WebhookOutcome::Rejected(failure);
            }
        };

        let body: JsonValue = match serde_json::from_slice(&delivery.body) {
            Ok(body) => body,
            Err(e) => {
                warn!(flow_id = %flow.id, error = %e, "webhook body is not JSON");
                return WebhookOutcome::Malformed {
                    reason: e.to_string(),
                };
            }
        };

        let mut payload = flatten(&body, node.id.as_str());
        payload.insert(
            self.validator.signature().event_key(node.id.as_str()),
            event_type.clone(),
        );

        let report = self.fanout.fanout(&flow, &node, &payload).await;
        info!(
            flow_id = %flow.id,
            node_id = %node.id,
            %event_type,
            fields = payload.len(),
            published = report.published(),
            failed = report.failed(),
            "webhook propagated"
        );

        WebhookOutcome::Propagated {
            flow_id: flow.id,
            node_id: node.id,
            event_type,
            fields: payload.len(),
            report,
        }
    }

    /// Handles an action event addressed to this service.
    #[instrument(skip_all, fields(node_id = %event.detail.node_detail.id))]
    pub async fn handle_action_event(&self, event: &ActionEvent) -> ActionEventOutcome {
        let node = &event.detail.node_detail;
        if !node.is_active() {
            info!("node is paused; skipping actions");
            return ActionEventOutcome::Inactive {
                node_id: node.id.clone(),
            };
        }

        let report = self
            .dispatcher
            .dispatch(node, &event.detail.flatten_data)
            .await;
        info!(
            completed = report.completed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "actions dispatched"
        );
        ActionEventOutcome::Dispatched(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{ActionDetail, DeliveryHeaders};
    use crate::validate::GITLAB;
    use async_trait::async_trait;
    use flowhook_core::{OrganizationId, WebhookId};
    use flowhook_flow::store::InMemoryFlowStore;
    use flowhook_flow::{
        ActionMeta, BusConfig, BusEntry, BusError, EventBus, FlatPayload, FlowGraph, FlowNode,
        NodeMeta,
    };
    use flowhook_provider::{
        AccessToken, ClientCredentialsRequest, ProviderError, ProviderHttp, ProviderRequest,
        ProviderResponse, TokenIssuer,
    };
    use rootcause::Report;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingBus {
        entries: Mutex<Vec<BusEntry>>,
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn publish(&self, entry: &BusEntry) -> Result<(), Report<BusError>> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHttp {
        requests: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait]
    impl ProviderHttp for RecordingHttp {
        async fn send(
            &self,
            request: &ProviderRequest,
        ) -> Result<ProviderResponse, Report<ProviderError>> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ProviderResponse { status: 200 })
        }
    }

    struct StaticIssuer;

    #[async_trait]
    impl TokenIssuer for StaticIssuer {
        async fn issue(
            &self,
            _request: &ClientCredentialsRequest,
        ) -> Result<AccessToken, Report<ProviderError>> {
            Ok(AccessToken::new("minted"))
        }
    }

    struct Harness {
        pipeline: HandlerPipeline,
        bus: Arc<RecordingBus>,
        http: Arc<RecordingHttp>,
    }

    fn harness() -> Harness {
        harness_with_flow_paused(false)
    }

    fn harness_with_flow_paused(paused: bool) -> Harness {
        let store = Arc::new(InMemoryFlowStore::new());
        let mut flow = FlowGraph::new(
            FlowId::new("flow-1"),
            OrganizationId::new("org-1"),
            "root".into(),
        );
        flow.paused = paused;
        store.insert_flow(WebhookId::new("hook-1"), flow);

        let mut meta = NodeMeta::default();
        meta.headers
            .insert("X-Gitlab-Token".to_string(), "s3cret".to_string());
        let root = FlowNode::new("root")
            .with_action("push")
            .with_meta(meta)
            .with_child("close")
            .with_child("notify");
        store.insert_node(FlowId::new("flow-1"), root);
        store.insert_node(
            FlowId::new("flow-1"),
            FlowNode::new("close").with_api("gitlabV4Handler"),
        );
        store.insert_node(
            FlowId::new("flow-1"),
            FlowNode::new("notify").with_api("slackHandler"),
        );

        let bus = Arc::new(RecordingBus::default());
        let http = Arc::new(RecordingHttp::default());
        let validator = WebhookValidator::new(store.clone(), GITLAB);
        let fanout = FanoutPublisher::new(store, bus.clone(), BusConfig::default());
        let dispatcher = ActionDispatcher::new(http.clone(), Arc::new(StaticIssuer));

        Harness {
            pipeline: HandlerPipeline::new(validator, fanout, dispatcher),
            bus,
            http,
        }
    }

    fn delivery(event: &str, token: &str, body: &[u8]) -> WebhookDelivery {
        WebhookDelivery {
            organization_id: OrganizationId::new("org-1"),
            webhook_id: WebhookId::new("hook-1"),
            headers: DeliveryHeaders::new()
                .with("User-Agent", "GitLab/16.5.0")
                .with("X-Gitlab-Event", event)
                .with("X-Gitlab-Token", token),
            body: body.to_vec(),
        }
    }

    #[tokio::test]
    async fn push_reaches_both_children() {
        let h = harness();
        let body = json!({"object_kind": "push", "commits": [{"id": "abc"}]}).to_string();

        let outcome = h
            .pipeline
            .handle_webhook(&delivery("push", "s3cret", body.as_bytes()))
            .await;

        match outcome {
            WebhookOutcome::Propagated {
                event_type, report, ..
            } => {
                assert_eq!(event_type, "push");
                assert_eq!(report.published(), 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let entries = h.bus.entries.lock().unwrap().clone();
        assert_eq!(entries.len(), 2);
        let apis: Vec<_> = entries
            .iter()
            .map(|e| e.detail.consumer_api.as_str())
            .collect();
        assert_eq!(apis, ["gitlabV4Handler", "slackHandler"]);
        for entry in &entries {
            let data = &entry.detail.flatten_data;
            assert_eq!(data.get_text("root_gitlab_event").as_deref(), Some("push"));
            assert_eq!(data.get_text("root_object_kind").as_deref(), Some("push"));
            assert_eq!(data.get_text("root_commits__0_id").as_deref(), Some("abc"));
        }
        assert_eq!(entries[0].detail.flatten_data, entries[1].detail.flatten_data);
    }

    #[tokio::test]
    async fn rejected_delivery_publishes_nothing() {
        let h = harness();

        let outcome = h
            .pipeline
            .handle_webhook(&delivery("merge_request", "s3cret", b"{}"))
            .await;
        assert!(matches!(
            outcome,
            WebhookOutcome::Rejected(ValidationFailure::UnsupportedEvent { .. })
        ));

        let outcome = h
            .pipeline
            .handle_webhook(&delivery("push", "nope", b"{}"))
            .await;
        assert!(matches!(
            outcome,
            WebhookOutcome::Rejected(ValidationFailure::Unauthorized { .. })
        ));

        assert!(h.bus.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn paused_flow_publishes_nothing() {
        let h = harness_with_flow_paused(true);
        let body = json!({"object_kind": "push"}).to_string();

        let outcome = h
            .pipeline
            .handle_webhook(&delivery("push", "s3cret", body.as_bytes()))
            .await;

        assert!(matches!(
            outcome,
            WebhookOutcome::Rejected(ValidationFailure::FlowInactive { .. })
        ));
        assert!(h.bus.entries.lock().unwrap().is_empty());
        assert!(h.http.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_stops_before_fanout() {
        let h = harness();

        let outcome = h
            .pipeline
            .handle_webhook(&delivery("push", "s3cret", b"not json"))
            .await;

        assert!(matches!(outcome, WebhookOutcome::Malformed { .. }));
        assert!(h.bus.entries.lock().unwrap().is_empty());
    }

    fn action_event(paused: bool) -> ActionEvent {
        let mut meta = NodeMeta {
            private_token: Some("pat".to_string()),
            ..NodeMeta::default()
        };
        meta.set_action(
            "closeMergeRequest",
            &ActionMeta {
                project_id: Some("root_project_id".to_string()),
                merge_request_id: Some("root_object_attributes_iid".to_string()),
                ..ActionMeta::default()
            },
        )
        .expect("action settings");
        let mut node = FlowNode::new("close")
            .with_action("closeMergeRequest")
            .with_meta(meta);
        node.paused = paused;

        let mut payload = FlatPayload::new();
        payload.insert("root_project_id", 15);
        payload.insert("root_object_attributes_iid", 7);

        ActionEvent {
            detail: ActionDetail {
                node_detail: node,
                flatten_data: payload,
            },
        }
    }

    #[tokio::test]
    async fn action_event_runs_node_actions() {
        let h = harness();

        let outcome = h.pipeline.handle_action_event(&action_event(false)).await;

        match outcome {
            ActionEventOutcome::Dispatched(report) => assert_eq!(report.completed(), 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let requests = h.http.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.as_str().ends_with("/projects/15/merge_requests/7"));
        assert_eq!(requests[0].access_token.secret(), "pat");
    }

    #[tokio::test]
    async fn paused_node_runs_nothing() {
        let h = harness();

        let outcome = h.pipeline.handle_action_event(&action_event(true)).await;

        assert!(matches!(outcome, ActionEventOutcome::Inactive { .. }));
        assert!(h.http.requests.lock().unwrap().is_empty());
        assert!(h.bus.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn node_under_paused_root_runs_nothing() {
        let h = harness();
        let mut event = action_event(false);
        event.detail.node_detail.root_paused = true;

        let outcome = h.pipeline.handle_action_event(&event).await;

        match outcome {
            ActionEventOutcome::Inactive { node_id } => assert_eq!(node_id.as_str(), "close"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(h.http.requests.lock().unwrap().is_empty());
    }
}
