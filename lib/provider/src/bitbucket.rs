//! Bitbucket Cloud actions.

use crate::action::{ActionContext, ActionStrategy, join_segments};
use crate::error::ActionError;
use reqwest::{Method, Url};

/// Bitbucket Cloud REST API root.
pub const API_BASE_URL: &str = "https://api.bitbucket.org/2.0";

/// Bitbucket OAuth token endpoint.
pub const TOKEN_URL: &str = "https://bitbucket.org/site/oauth2/access_token";

/// `POST /repositories/{workspace}/{repo_slug}/pullrequests/{id}/decline`
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclinePullRequest;

impl ActionStrategy for DeclinePullRequest {
    fn method(&self) -> Method {
        Method::POST
    }

    fn default_base_url(&self) -> &'static str {
        API_BASE_URL
    }

    fn default_token_url(&self) -> &'static str {
        TOKEN_URL
    }

    fn target(&self, ctx: &ActionContext<'_>, base_url: &str) -> Result<Url, ActionError> {
        let workspace = ctx.require_setting(&ctx.node.meta.workspace, "workspace")?;
        let repo_slug = ctx.require_setting(&ctx.node.meta.repo_slug, "repoSlug")?;
        let pr_id = ctx.payload_value(&ctx.settings.pr_id, "prId")?;

        join_segments(
            base_url,
            &[
                "repositories",
                workspace,
                repo_slug,
                "pullrequests",
                &pr_id,
                "decline",
            ],
        )
    }
}
