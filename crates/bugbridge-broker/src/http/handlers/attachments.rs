use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::http::{
    SharedContext,
    error::AppError,
    extract::{require_entitled, require_owner},
    util::execute_or_reconnect,
};
use bugbridge_core::{CredentialStore, TRACKER_PROVIDER};

/// Encoded-payload ceiling; larger uploads are refused before decoding.
const MAX_IMAGE_BYTES: usize = 10_000_000;

#[derive(Deserialize)]
pub struct AttachRequest {
    /// `data:<mime>;base64,<payload>` as captured by the browser.
    pub image: String,
}

/// Attach the captured screenshot or GIF to an existing issue.
pub async fn upload<S>(
    headers: HeaderMap,
    Path(issue_key): Path<String>,
    State(ctx): State<SharedContext<S>>,
    Json(AttachRequest { image }): Json<AttachRequest>,
) -> Result<Json<Value>, AppError>
where
    S: CredentialStore + 'static,
{
    let owner = require_owner(&headers)?;
    require_entitled(&ctx, &owner).await?;

    if issue_key.is_empty() || image.is_empty() {
        return Err(AppError::bad_request("MISSING_REQUIRED_FIELDS"));
    }
    if image.len() > MAX_IMAGE_BYTES {
        return Err(AppError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "IMAGE_TOO_LARGE",
        ));
    }

    let (mime, data) = decode_data_url(&image).ok_or_else(|| {
        AppError::bad_request("INVALID_IMAGE")
    })?;
    let file_name = if mime.contains("gif") { "bug.gif" } else { "bug.png" };

    let credential = ctx
        .store
        .get(&owner, TRACKER_PROVIDER)?
        .ok_or_else(AppError::not_connected)?;
    let url = format!(
        "{}/rest/api/3/issue/{issue_key}/attachments",
        ctx.tracker.site_api_base(&credential.site_id)
    );

    let (response, _) = execute_or_reconnect(&ctx, credential, |token| {
        // Multipart bodies are single-use, so the form is rebuilt for the
        // retry with a rotated token.
        let part = multipart::Part::bytes(data.clone()).file_name(file_name);
        let part = match part.mime_str(&mime) {
            Ok(part) => part,
            Err(_) => multipart::Part::bytes(data.clone()).file_name(file_name),
        };
        let form = multipart::Form::new().part("file", part);
        ctx.http
            .post(&url)
            .bearer_auth(token)
            .header("X-Atlassian-Token", "no-check")
            .multipart(form)
    })
    .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::bad_request("ATTACH_FAILED").with_details(json!(body)));
    }

    Ok(Json(json!({ "ok": true })))
}

/// Split a `data:` URL into its mime type and decoded payload.
fn decode_data_url(input: &str) -> Option<(String, Vec<u8>)> {
    let rest = input.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    if mime.is_empty() {
        return None;
    }
    let data = BASE64_STANDARD.decode(payload.as_bytes()).ok()?;
    Some((mime.to_owned(), data))
}
