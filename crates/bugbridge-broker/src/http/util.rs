use reqwest::{RequestBuilder, Response};

use super::{SharedContext, error::AppError};
use bugbridge_core::{Credential, CredentialStore, ExecuteOutcome};

/// Run a tracker call through the refresh-and-retry executor, mapping the
/// terminal outcome to the reconnect-required error every endpoint must
/// surface. The returned credential carries any rotation that happened.
pub async fn execute_or_reconnect<S, F>(
    ctx: &SharedContext<S>,
    credential: Credential,
    build_request: F,
) -> Result<(Response, Credential), AppError>
where
    S: CredentialStore + 'static,
    F: Fn(&str) -> RequestBuilder,
{
    match ctx.executor.execute(credential, build_request).await? {
        ExecuteOutcome::Completed {
            response,
            credential,
        } => Ok((response, credential)),
        ExecuteOutcome::ReconnectRequired => Err(AppError::reconnect_required()),
    }
}
