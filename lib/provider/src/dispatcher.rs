//! Runs a node's provider actions.
//!
//! Actions execute one at a time in the order the node lists them, each
//! awaited before the next starts. A failing action is logged and recorded
//! and the remaining actions still run. Names without an entry in the action
//! table are skipped.

use crate::action::{ActionContext, ActionKind, Credentials, PreparedCall};
use crate::error::{ActionError, ProviderError};
use crate::http::{ProviderHttp, ProviderRequest};
use crate::token::TokenIssuer;
use flowhook_flow::{FlatPayload, FlowNode, RetryPolicy};
use rootcause::Report;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What happened to one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The name has no entry in the action table.
    Skipped,
    /// The provider accepted the call.
    Completed { status: u16 },
}

/// Why an action failed.
#[derive(Debug)]
pub enum ActionFailure {
    /// The call could not be resolved from settings and payload.
    Prepare(ActionError),
    /// Token exchange or the provider call failed.
    Provider(Report<ProviderError>),
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare(e) => write!(f, "{e}"),
            Self::Provider(e) => write!(f, "{e}"),
        }
    }
}

/// Result of running one action.
pub type ActionResult = Result<ActionOutcome, ActionFailure>;

/// Per-action results, in execution order.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// `(action name, result)` pairs.
    pub actions: Vec<(String, ActionResult)>,
}

impl DispatchReport {
    /// Number of actions the provider accepted.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.actions
            .iter()
            .filter(|(_, r)| matches!(r, Ok(ActionOutcome::Completed { .. })))
            .count()
    }

    /// Number of actions that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.actions.iter().filter(|(_, r)| r.is_err()).count()
    }

    /// Number of unknown action names.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.actions
            .iter()
            .filter(|(_, r)| matches!(r, Ok(ActionOutcome::Skipped)))
            .count()
    }
}

/// Executes provider actions for a node.
#[derive(Clone)]
pub struct ActionDispatcher {
    http: Arc<dyn ProviderHttp>,
    tokens: Arc<dyn TokenIssuer>,
    retry: RetryPolicy,
}

impl ActionDispatcher {
    /// Creates a dispatcher with a single-attempt retry policy.
    pub fn new(http: Arc<dyn ProviderHttp>, tokens: Arc<dyn TokenIssuer>) -> Self {
        Self {
            http,
            tokens,
            retry: RetryPolicy::none(),
        }
    }

    /// Sets the retry policy used for token exchanges and provider calls.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs every action listed on `node`.
    #[instrument(skip_all, fields(node_id = %node.id, actions = node.actions.len()))]
    pub async fn dispatch(&self, node: &FlowNode, payload: &FlatPayload) -> DispatchReport {
        let mut report = DispatchReport::default();

        for action in &node.actions {
            let result = self.run(action, node, payload).await;
            match &result {
                Ok(ActionOutcome::Skipped) => debug!(%action, "no handler for action"),
                Ok(ActionOutcome::Completed { status }) => {
                    info!(%action, status, "action completed");
                }
                Err(e) => warn!(%action, error = %e, "action failed"),
            }
            report.actions.push((action.clone(), result));
        }

        report
    }

    async fn run(&self, action: &str, node: &FlowNode, payload: &FlatPayload) -> ActionResult {
        let Some(kind) = ActionKind::from_name(action) else {
            return Ok(ActionOutcome::Skipped);
        };

        let call = ActionContext::new(action, node, payload)
            .and_then(|ctx| kind.strategy().prepare(&ctx))
            .map_err(ActionFailure::Prepare)?;

        self.execute(call).await.map_err(ActionFailure::Provider)
    }

    async fn execute(&self, call: PreparedCall) -> Result<ActionOutcome, Report<ProviderError>> {
        let access_token = match call.credentials {
            Credentials::Static(token) => token,
            Credentials::ClientCredentials(request) => {
                self.retry
                    .run_when(|_| self.tokens.issue(&request), transient)
                    .await?
            }
        };

        let request = ProviderRequest {
            method: call.method,
            url: call.url,
            access_token,
            body: call.body,
        };
        let response = self
            .retry
            .run_when(|_| self.http.send(&request), transient)
            .await?;

        Ok(ActionOutcome::Completed {
            status: response.status,
        })
    }
}

fn transient(error: &Report<ProviderError>) -> bool {
    error.current_context().is_transient()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ProviderResponse;
    use crate::token::{AccessToken, ClientCredentialsRequest};
    use async_trait::async_trait;
    use flowhook_flow::{ActionMeta, NodeMeta};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records requests; fails when the URL contains a configured fragment.
    #[derive(Default)]
    struct RecordingHttp {
        requests: Mutex<Vec<ProviderRequest>>,
        fail_when_url_contains: Option<String>,
        fail_status: Option<u16>,
    }

    impl RecordingHttp {
        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderHttp for RecordingHttp {
        async fn send(
            &self,
            request: &ProviderRequest,
        ) -> Result<ProviderResponse, Report<ProviderError>> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.fail_when_url_contains {
                Some(fragment) if request.url.as_str().contains(fragment.as_str()) => {
                    Err(ProviderError::Status {
                        status: self.fail_status.unwrap_or(500),
                        body: "boom".to_string(),
                    }
                    .into())
                }
                _ => Ok(ProviderResponse { status: 200 }),
            }
        }
    }

    /// Issues a fixed token, or always fails.
    #[derive(Default)]
    struct StubIssuer {
        fail: bool,
        calls: Mutex<Vec<ClientCredentialsRequest>>,
    }

    #[async_trait]
    impl TokenIssuer for StubIssuer {
        async fn issue(
            &self,
            request: &ClientCredentialsRequest,
        ) -> Result<AccessToken, Report<ProviderError>> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ProviderError::TokenRejected {
                    reason: "invalid_client".to_string(),
                }
                .into());
            }
            Ok(AccessToken::new("minted"))
        }
    }

    fn node(actions: &[&str]) -> FlowNode {
        let mut meta = NodeMeta {
            workspace: Some("acme".to_string()),
            repo_slug: Some("widgets".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            ..NodeMeta::default()
        };
        meta.set_action(
            "declinePullRequest",
            &ActionMeta {
                pr_id: Some("root_pullrequest_id".to_string()),
                ..ActionMeta::default()
            },
        )
        .expect("action settings");
        meta.set_action(
            "closeMergeRequest",
            &ActionMeta {
                project_id: Some("root_project_id".to_string()),
                merge_request_id: Some("root_object_attributes_iid".to_string()),
                ..ActionMeta::default()
            },
        )
        .expect("action settings");

        let mut node = FlowNode::new("child").with_meta(meta);
        for action in actions {
            node = node.with_action(*action);
        }
        node
    }

    fn payload() -> FlatPayload {
        let mut payload = FlatPayload::new();
        payload.insert("root_pullrequest_id", 42);
        payload.insert("root_project_id", 15);
        payload.insert("root_object_attributes_iid", 7);
        payload
    }

    #[tokio::test]
    async fn runs_actions_in_order_with_minted_token() {
        let http = Arc::new(RecordingHttp::default());
        let issuer = Arc::new(StubIssuer::default());
        let dispatcher = ActionDispatcher::new(http.clone(), issuer.clone());

        let report = dispatcher
            .dispatch(
                &node(&["declinePullRequest", "closeMergeRequest"]),
                &payload(),
            )
            .await;

        assert_eq!(report.completed(), 2);
        let requests = http.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::POST);
        assert!(requests[0].url.as_str().ends_with("/pullrequests/42/decline"));
        assert_eq!(requests[1].method, Method::PUT);
        assert!(requests[1].url.as_str().ends_with("/projects/15/merge_requests/7"));
        assert_eq!(requests[1].body, Some(json!({"state_event": "close"})));
        assert!(requests.iter().all(|r| r.access_token.secret() == "minted"));

        let calls = issuer.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].token_url, crate::bitbucket::TOKEN_URL);
        assert_eq!(calls[1].token_url, crate::gitlab::TOKEN_URL);
    }

    #[tokio::test]
    async fn failed_action_does_not_stop_the_next() {
        let http = Arc::new(RecordingHttp {
            fail_when_url_contains: Some("/decline".to_string()),
            ..RecordingHttp::default()
        });
        let dispatcher = ActionDispatcher::new(http.clone(), Arc::new(StubIssuer::default()));

        let report = dispatcher
            .dispatch(
                &node(&["declinePullRequest", "closeMergeRequest"]),
                &payload(),
            )
            .await;

        assert_eq!(report.failed(), 1);
        assert_eq!(report.completed(), 1);
        assert!(matches!(
            report.actions[0].1,
            Err(ActionFailure::Provider(_))
        ));
        assert_eq!(http.requests().len(), 2);
    }

    #[tokio::test]
    async fn token_failure_is_isolated() {
        let http = Arc::new(RecordingHttp::default());
        let issuer = Arc::new(StubIssuer {
            fail: true,
            ..StubIssuer::default()
        });
        let dispatcher = ActionDispatcher::new(http.clone(), issuer);

        let report = dispatcher
            .dispatch(
                &node(&["declinePullRequest", "closeMergeRequest"]),
                &payload(),
            )
            .await;

        assert_eq!(report.failed(), 2);
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn prepare_failure_is_isolated() {
        let http = Arc::new(RecordingHttp::default());
        let dispatcher = ActionDispatcher::new(http.clone(), Arc::new(StubIssuer::default()));

        let mut payload = payload();
        payload.insert("root_pullrequest_id", serde_json::Value::Null);
        let report = dispatcher
            .dispatch(
                &node(&["declinePullRequest", "closeMergeRequest"]),
                &payload,
            )
            .await;

        assert!(matches!(
            report.actions[0].1,
            Err(ActionFailure::Prepare(ActionError::MissingPayloadValue { .. }))
        ));
        assert_eq!(report.completed(), 1);
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn unknown_actions_are_skipped() {
        let http = Arc::new(RecordingHttp::default());
        let dispatcher = ActionDispatcher::new(http.clone(), Arc::new(StubIssuer::default()));

        let report = dispatcher
            .dispatch(&node(&["push", "merge_request"]), &payload())
            .await;

        assert_eq!(report.skipped(), 2);
        assert_eq!(report.failed(), 0);
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn retries_provider_calls_under_policy() {
        let http = Arc::new(RecordingHttp {
            fail_when_url_contains: Some("/merge_requests/".to_string()),
            ..RecordingHttp::default()
        });
        let dispatcher = ActionDispatcher::new(http.clone(), Arc::new(StubIssuer::default()))
            .with_retry(RetryPolicy::new(3, Duration::ZERO));

        let report = dispatcher
            .dispatch(&node(&["closeMergeRequest"]), &payload())
            .await;

        assert_eq!(report.failed(), 1);
        assert_eq!(http.requests().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let http = Arc::new(RecordingHttp {
            fail_when_url_contains: Some("/merge_requests/".to_string()),
            fail_status: Some(404),
            ..RecordingHttp::default()
        });
        let dispatcher = ActionDispatcher::new(http.clone(), Arc::new(StubIssuer::default()))
            .with_retry(RetryPolicy::new(3, Duration::ZERO));

        let report = dispatcher
            .dispatch(&node(&["closeMergeRequest"]), &payload())
            .await;

        assert_eq!(report.failed(), 1);
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn rejected_credentials_are_not_retried() {
        let issuer = Arc::new(StubIssuer {
            fail: true,
            ..StubIssuer::default()
        });
        let dispatcher = ActionDispatcher::new(Arc::new(RecordingHttp::default()), issuer.clone())
            .with_retry(RetryPolicy::new(3, Duration::ZERO));

        let report = dispatcher
            .dispatch(&node(&["declinePullRequest"]), &payload())
            .await;

        assert_eq!(report.failed(), 1);
        assert_eq!(issuer.calls.lock().unwrap().len(), 1);
    }
}
