use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tracing::warn;

use crate::http::{SharedContext, error::AppError};
use bugbridge_core::CredentialStore;

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Provider redirect target: validate state, exchange the code, persist
/// the credential and send the browser back to the application — with a
/// clean URL, no query parameters.
pub async fn complete<S>(
    Query(CallbackQuery { code, state, error }): Query<CallbackQuery>,
    State(ctx): State<SharedContext<S>>,
) -> Result<impl IntoResponse, AppError>
where
    S: CredentialStore + 'static,
{
    if let Some(error) = error {
        warn!(
            target: "bugbridge.callback",
            error = error.as_str(),
            "provider declined authorization",
        );
        return Err(AppError::bad_request("AUTHORIZATION_DECLINED"));
    }

    let code = code.ok_or_else(|| AppError::bad_request("MISSING_CODE"))?;
    let state = state.ok_or_else(|| AppError::bad_request("MISSING_STATE"))?;

    ctx.lifecycle.complete_authorization(&code, &state).await?;

    Ok(Redirect::temporary(&ctx.app_base_url))
}
