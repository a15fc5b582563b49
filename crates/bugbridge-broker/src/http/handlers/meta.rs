use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::http::{
    SharedContext,
    error::AppError,
    extract::{require_entitled, require_owner},
    util::execute_or_reconnect,
};
use bugbridge_core::{Credential, CredentialStore, TRACKER_PROVIDER};

#[derive(Deserialize)]
pub struct MetaQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MetaOption {
    pub id: String,
    pub name: String,
}

/// Everything the issue-creation form needs, aggregated in one response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaResponse {
    pub projects: Vec<MetaOption>,
    pub issue_types: Vec<MetaOption>,
    pub priorities: Vec<MetaOption>,
    pub assignees: Vec<MetaOption>,
    pub sprints: Vec<MetaOption>,
}

pub async fn get_meta<S>(
    headers: HeaderMap,
    Query(MetaQuery { project_id }): Query<MetaQuery>,
    State(ctx): State<SharedContext<S>>,
) -> Result<Json<MetaResponse>, AppError>
where
    S: CredentialStore + 'static,
{
    let owner = require_owner(&headers)?;
    require_entitled(&ctx, &owner).await?;

    let mut credential = ctx
        .store
        .get(&owner, TRACKER_PROVIDER)?
        .ok_or_else(AppError::not_connected)?;
    let base = ctx.tracker.site_api_base(&credential.site_id);

    let (value, kept) = fetch_json(
        &ctx,
        credential,
        format!("{base}/rest/api/3/project/search"),
    )
    .await?;
    credential = kept;
    let project_values = value
        .get("values")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let projects = options_from(&project_values);
    let project_id = project_id
        .filter(|id| !id.is_empty())
        .or_else(|| project_values.first().and_then(id_of));

    let mut issue_types = Vec::new();
    if let Some(project_id) = &project_id {
        let (value, kept) = fetch_json(
            &ctx,
            credential,
            format!("{base}/rest/api/3/issuetype/project?projectId={project_id}"),
        )
        .await?;
        credential = kept;
        issue_types = options_from(&array_or_values(&value));
    }

    let (value, kept) =
        fetch_json(&ctx, credential, format!("{base}/rest/api/3/priority")).await?;
    credential = kept;
    let priorities = value
        .as_array()
        .map(|items| options_from(items))
        .unwrap_or_default();

    let (value, kept) = fetch_json(
        &ctx,
        credential,
        format!("{base}/rest/api/3/users/search?maxResults=50"),
    )
    .await?;
    credential = kept;
    let assignees = value
        .as_array()
        .map(|users| {
            users
                .iter()
                .filter_map(|user| {
                    let id = user.get("accountId").and_then(Value::as_str)?;
                    let name = user
                        .get("displayName")
                        .and_then(Value::as_str)
                        .or_else(|| user.get("emailAddress").and_then(Value::as_str))
                        .unwrap_or("User");
                    Some(MetaOption {
                        id: id.to_owned(),
                        name: name.to_owned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    // Sprints only exist for scrum boards; any failure here degrades to an
    // empty list rather than sinking the whole response.
    let sprints = match project_id {
        Some(project_id) => fetch_sprints(&ctx, &base, credential, &project_id)
            .await
            .unwrap_or_else(|err| {
                warn!(
                    target: "bugbridge.meta",
                    error = %err,
                    "sprint lookup failed, returning none",
                );
                Vec::new()
            }),
        None => Vec::new(),
    };

    Ok(Json(MetaResponse {
        projects,
        issue_types,
        priorities,
        assignees,
        sprints,
    }))
}

async fn fetch_json<S>(
    ctx: &SharedContext<S>,
    credential: Credential,
    url: String,
) -> Result<(Value, Credential), AppError>
where
    S: CredentialStore + 'static,
{
    let (response, credential) = execute_or_reconnect(ctx, credential, |token| {
        ctx.http
            .get(&url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
    })
    .await?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(AppError::upstream(status.as_u16(), body));
    }

    let value = serde_json::from_str(&body)
        .map_err(|err| AppError::upstream(status.as_u16(), err.to_string()))?;
    Ok((value, credential))
}

async fn fetch_sprints<S>(
    ctx: &SharedContext<S>,
    base: &str,
    credential: Credential,
    project_id: &str,
) -> Result<Vec<MetaOption>, AppError>
where
    S: CredentialStore + 'static,
{
    let (boards, credential) = fetch_json(
        ctx,
        credential,
        format!("{base}/rest/agile/1.0/board?maxResults=100"),
    )
    .await?;

    let board_id = boards
        .get("values")
        .and_then(Value::as_array)
        .and_then(|boards| {
            boards.iter().find(|board| {
                board
                    .pointer("/location/projectId")
                    .map(value_to_string)
                    .as_deref()
                    == Some(project_id)
            })
        })
        .and_then(|board| board.get("id").map(value_to_string));

    let Some(board_id) = board_id else {
        return Ok(Vec::new());
    };

    let (sprint_data, _) = fetch_json(
        ctx,
        credential,
        format!("{base}/rest/agile/1.0/board/{board_id}/sprint?state=active,future"),
    )
    .await?;

    Ok(sprint_data
        .get("values")
        .and_then(Value::as_array)
        .map(|sprints| options_from(sprints))
        .unwrap_or_default())
}

fn options_from(items: &[Value]) -> Vec<MetaOption> {
    items
        .iter()
        .filter_map(|item| {
            let id = id_of(item)?;
            let name = item.get("name").and_then(Value::as_str)?;
            Some(MetaOption {
                id,
                name: name.to_owned(),
            })
        })
        .collect()
}

fn array_or_values(value: &Value) -> Vec<Value> {
    match value.as_array() {
        Some(items) => items.clone(),
        None => value
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn id_of(value: &Value) -> Option<String> {
    value.get("id").map(value_to_string).filter(|id| !id.is_empty())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
