//! GitLab actions.

use crate::action::{ActionContext, ActionStrategy, join_segments};
use crate::error::ActionError;
use reqwest::{Method, Url};
use serde_json::{Value as JsonValue, json};

/// GitLab.com REST API root.
pub const API_BASE_URL: &str = "https://gitlab.com/api/v4";

/// GitLab.com OAuth token endpoint.
pub const TOKEN_URL: &str = "https://gitlab.com/oauth/token";

/// `PUT /projects/{id}/merge_requests/{iid}` with `state_event=close`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseMergeRequest;

impl ActionStrategy for CloseMergeRequest {
    fn method(&self) -> Method {
        Method::PUT
    }

    fn accepts_node_endpoints(&self) -> bool {
        true
    }

    fn default_base_url(&self) -> &'static str {
        API_BASE_URL
    }

    fn default_token_url(&self) -> &'static str {
        TOKEN_URL
    }

    fn target(&self, ctx: &ActionContext<'_>, base_url: &str) -> Result<Url, ActionError> {
        let project_id = ctx.payload_value(&ctx.settings.project_id, "projectId")?;
        let merge_request_id =
            ctx.payload_value(&ctx.settings.merge_request_id, "mergeRequestId")?;

        join_segments(
            base_url,
            &["projects", &project_id, "merge_requests", &merge_request_id],
        )
    }

    fn default_body(&self) -> Option<JsonValue> {
        Some(json!({"state_event": "close"}))
    }
}
