use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
};

use crate::{
    http::{
        SharedContext,
        error::AppError,
        extract::{require_entitled, require_owner},
    },
    rate_limit,
};
use bugbridge_core::CredentialStore;

/// Start the authorization round-trip: redirect the browser to the
/// provider's consent screen.
pub async fn begin<S>(
    headers: HeaderMap,
    State(ctx): State<SharedContext<S>>,
) -> Result<impl IntoResponse, AppError>
where
    S: CredentialStore + 'static,
{
    let owner = require_owner(&headers)?;
    require_entitled(&ctx, &owner).await?;

    ctx.rate_limiter
        .check(&rate_limit::key(&owner, "connect"))
        .await
        .map_err(|_| AppError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"))?;

    let url = ctx.lifecycle.begin_authorization(&owner)?;
    Ok(Redirect::temporary(url.as_str()))
}

/// Drop the stored connection. Succeeds whether or not one exists.
pub async fn disconnect<S>(
    headers: HeaderMap,
    State(ctx): State<SharedContext<S>>,
) -> Result<impl IntoResponse, AppError>
where
    S: CredentialStore + 'static,
{
    let owner = require_owner(&headers)?;
    ctx.lifecycle.disconnect(&owner)?;
    Ok(StatusCode::NO_CONTENT)
}
