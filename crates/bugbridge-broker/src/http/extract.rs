use axum::http::HeaderMap;

use super::{SharedContext, error::AppError};
use bugbridge_core::CredentialStore;

/// Header carrying the resolved account identifier, set by the fronting
/// session layer. The broker trusts it as given.
pub const OWNER_HEADER: &str = "x-account-id";

pub fn require_owner(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| AppError::unauthorized("UNAUTHORIZED"))
}

/// Evaluate the paid-tier gate for an owner before a tracker operation.
pub async fn require_entitled<S>(ctx: &SharedContext<S>, owner: &str) -> Result<(), AppError>
where
    S: CredentialStore + 'static,
{
    if ctx.entitlements.allows(owner).await {
        Ok(())
    } else {
        Err(AppError::plan_required())
    }
}
