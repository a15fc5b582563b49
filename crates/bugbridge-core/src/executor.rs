use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tracing::info;

use crate::{
    config::TrackerConfig,
    refresh::TokenRefresher,
    storage::{CredentialStore, StoreError},
    types::Credential,
};

/// Result of running a request through the refresh-and-retry protocol.
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// The request completed; the response may still carry a non-auth error
    /// status, which is the caller's to interpret. The credential is the
    /// one actually used, rotated when a refresh happened underway.
    Completed {
        response: Response,
        credential: Credential,
    },
    /// The credential is unusable and has been removed from the store; the
    /// owner must re-authorize. Callers surface this as a distinct
    /// reconnect-required outcome, never as a generic error.
    ReconnectRequired,
}

/// Wraps outbound provider calls with the single-retry refresh protocol.
///
/// First attempt runs with the stored access token. Any status other than
/// 401/403 — success and application errors alike — is final. On an auth
/// failure the refresher runs once, the request is rebuilt with the new
/// token and retried exactly once. A failed refresh, or a second auth
/// failure after a successful one, is terminal: the credential is revoked
/// at the provider (or otherwise beyond repair), so the stored record is
/// deleted and `ReconnectRequired` returned. Capping at one retry keeps a
/// permanently-401 provider from looping the refresh forever.
pub struct RequestExecutor<S> {
    refresher: TokenRefresher<S>,
    store: Arc<S>,
}

impl<S> RequestExecutor<S>
where
    S: CredentialStore,
{
    pub fn new(config: TrackerConfig, http: Client, store: Arc<S>) -> Self {
        Self {
            refresher: TokenRefresher::new(config, http, store.clone()),
            store,
        }
    }

    /// Issue a request built by `build_request`, refreshing and retrying
    /// once on an auth failure.
    ///
    /// `build_request` must be a pure function of the bearer token so the
    /// same logical call can be replayed with a rotated token.
    pub async fn execute<F>(
        &self,
        credential: Credential,
        build_request: F,
    ) -> Result<ExecuteOutcome, ExecuteError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let response = build_request(&credential.access_token).send().await?;
        if !is_auth_failure(response.status()) {
            return Ok(ExecuteOutcome::Completed {
                response,
                credential,
            });
        }

        let Some(refreshed) = self.refresher.refresh(&credential).await else {
            self.discard(&credential)?;
            return Ok(ExecuteOutcome::ReconnectRequired);
        };

        let retry = build_request(&refreshed.access_token).send().await?;
        if is_auth_failure(retry.status()) {
            self.discard(&refreshed)?;
            return Ok(ExecuteOutcome::ReconnectRequired);
        }

        Ok(ExecuteOutcome::Completed {
            response: retry,
            credential: refreshed,
        })
    }

    fn discard(&self, credential: &Credential) -> Result<(), ExecuteError> {
        info!(
            target: "bugbridge.executor",
            owner = credential.owner.as_str(),
            provider = credential.provider.as_str(),
            "discarding unusable credential; reconnect required",
        );
        self.store.delete(&credential.owner, &credential.provider)?;
        Ok(())
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Failures outside the protocol itself.
///
/// Transport errors (timeouts included) surface here rather than being
/// reinterpreted as auth failures.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
