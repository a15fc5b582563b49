use axum::{Json, extract::State, http::HeaderMap};
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::http::{
    SharedContext,
    error::AppError,
    extract::{require_entitled, require_owner},
    util::execute_or_reconnect,
};
use bugbridge_core::{Credential, CredentialStore, TRACKER_PROVIDER};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIssueRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub issue_type_id: String,
    #[serde(default)]
    pub priority_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub sprint_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIssueResponse {
    pub issue_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
}

/// Create a tracker issue from a generated bug report, optionally placing
/// it into a sprint.
pub async fn create_issue<S>(
    headers: HeaderMap,
    State(ctx): State<SharedContext<S>>,
    Json(request): Json<CreateIssueRequest>,
) -> Result<Json<CreateIssueResponse>, AppError>
where
    S: CredentialStore + 'static,
{
    let owner = require_owner(&headers)?;
    require_entitled(&ctx, &owner).await?;

    if request.title.is_empty()
        || request.description.is_empty()
        || request.project_id.is_empty()
        || request.issue_type_id.is_empty()
    {
        return Err(AppError::bad_request("MISSING_REQUIRED_FIELDS"));
    }

    let mut credential = ctx
        .store
        .get(&owner, TRACKER_PROVIDER)?
        .ok_or_else(AppError::not_connected)?;
    let base = ctx.tracker.site_api_base(&credential.site_id);

    let fields = issue_fields(&request);
    let create_url = format!("{base}/rest/api/3/issue");
    let (response, kept) = execute_or_reconnect(&ctx, credential, |token| {
        ctx.http
            .post(&create_url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&json!({ "fields": fields }))
    })
    .await?;
    credential = kept;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        let details: Value = serde_json::from_str(&body).unwrap_or(Value::String(body));
        return Err(AppError::bad_request("ISSUE_CREATE_FAILED").with_details(details));
    }

    let created: Value = serde_json::from_str(&body)
        .map_err(|err| AppError::upstream(status.as_u16(), err.to_string()))?;
    let issue_key = created
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AppError::upstream(status.as_u16(), "issue response missing key".to_string())
        })?
        .to_owned();

    let issue_url = browse_url(credential.site_url.as_deref(), &issue_key);

    if let Some(sprint_id) = request
        .sprint_id
        .as_deref()
        .filter(|sprint| !sprint.is_empty())
    {
        add_to_sprint(&ctx, &base, credential, sprint_id, &issue_key).await?;
    }

    Ok(Json(CreateIssueResponse {
        issue_key,
        issue_url,
    }))
}

fn issue_fields(request: &CreateIssueRequest) -> Value {
    let mut fields = json!({
        "summary": request.title,
        "project": { "id": request.project_id },
        "issuetype": { "id": request.issue_type_id },
        "description": {
            "type": "doc",
            "version": 1,
            "content": [
                {
                    "type": "paragraph",
                    "content": [{ "type": "text", "text": request.description }],
                }
            ],
        },
    });
    if let Some(priority_id) = request
        .priority_id
        .as_deref()
        .filter(|id| !id.is_empty())
    {
        fields["priority"] = json!({ "id": priority_id });
    }
    if let Some(assignee_id) = request
        .assignee_id
        .as_deref()
        .filter(|id| !id.is_empty())
    {
        fields["assignee"] = json!({ "id": assignee_id });
    }
    fields
}

/// Place the fresh issue into a sprint. Auth failures propagate (the issue
/// exists but the connection is dead); any other failure only logs, the
/// issue itself was created fine.
async fn add_to_sprint<S>(
    ctx: &SharedContext<S>,
    base: &str,
    credential: Credential,
    sprint_id: &str,
    issue_key: &str,
) -> Result<(), AppError>
where
    S: CredentialStore + 'static,
{
    let sprint_url = format!("{base}/rest/agile/1.0/sprint/{sprint_id}/issue");
    let (response, _) = execute_or_reconnect(ctx, credential, |token| {
        ctx.http
            .post(&sprint_url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&json!({ "issues": [issue_key] }))
    })
    .await?;

    if !response.status().is_success() {
        warn!(
            target: "bugbridge.issues",
            issue_key,
            sprint_id,
            status = response.status().as_u16(),
            "failed to add issue to sprint",
        );
    }
    Ok(())
}

fn browse_url(site_url: Option<&str>, issue_key: &str) -> Option<String> {
    site_url.map(|site_url| format!("{}/browse/{issue_key}", site_url.trim_end_matches('/')))
}
