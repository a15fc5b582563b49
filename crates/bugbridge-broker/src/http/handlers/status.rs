use axum::{Json, extract::State, http::HeaderMap};
use serde::Serialize;
use tracing::warn;

use crate::http::{
    SharedContext,
    error::AppError,
    extract::{require_entitled, require_owner},
};
use bugbridge_core::{ConnectionStatus, CredentialStore, ProbeError};

#[derive(Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Live connection health for the status-polling UI.
///
/// This runs a real authenticated probe, so an expiring access token is
/// refreshed (or the dead credential cleaned up) as a side effect.
pub async fn get_status<S>(
    headers: HeaderMap,
    State(ctx): State<SharedContext<S>>,
) -> Result<Json<StatusResponse>, AppError>
where
    S: CredentialStore + 'static,
{
    let owner = require_owner(&headers)?;
    require_entitled(&ctx, &owner).await?;

    let response = match ctx.probe.check(&owner).await {
        Ok(ConnectionStatus::Connected { .. }) => StatusResponse {
            connected: true,
            reason: None,
        },
        Ok(ConnectionStatus::NotConnected) => StatusResponse {
            connected: false,
            reason: None,
        },
        Ok(ConnectionStatus::Expired) => StatusResponse {
            connected: false,
            reason: Some("EXPIRED"),
        },
        // A non-auth provider fault is no verdict on the credential;
        // report unavailable without tearing the connection down.
        Err(ProbeError::Unhealthy { status }) => {
            warn!(
                target: "bugbridge.status",
                owner = owner.as_str(),
                status,
                "probe hit provider fault",
            );
            StatusResponse {
                connected: false,
                reason: Some("UNAVAILABLE"),
            }
        }
        Err(err) => return Err(err.into()),
    };

    Ok(Json(response))
}
