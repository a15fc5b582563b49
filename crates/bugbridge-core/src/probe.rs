use std::sync::Arc;

use reqwest::{Client, header};
use thiserror::Error;
use tracing::warn;

use crate::{
    config::TrackerConfig,
    executor::{ExecuteError, ExecuteOutcome, RequestExecutor},
    storage::{CredentialStore, StoreError},
    types::{Credential, TRACKER_PROVIDER},
};

/// Answer to "is this integration still usable".
#[derive(Debug)]
pub enum ConnectionStatus {
    /// No credential is stored for the owner.
    NotConnected,
    /// The probe call succeeded; the credential carries any rotation that
    /// happened underway so follow-up calls in the same request reuse it.
    Connected { credential: Credential },
    /// The credential was terminally rejected and has been deleted.
    Expired,
}

/// Checks integration health with a side-effect-free identity call.
///
/// The only state change a probe may cause is a token refresh (and the
/// deletion of a terminally dead credential).
pub struct HealthProbe<S> {
    config: TrackerConfig,
    http: Client,
    executor: Arc<RequestExecutor<S>>,
    store: Arc<S>,
}

impl<S> HealthProbe<S>
where
    S: CredentialStore,
{
    pub fn new(
        config: TrackerConfig,
        http: Client,
        executor: Arc<RequestExecutor<S>>,
        store: Arc<S>,
    ) -> Self {
        Self {
            config,
            http,
            executor,
            store,
        }
    }

    pub async fn check(&self, owner: &str) -> Result<ConnectionStatus, ProbeError> {
        let credential = match self.store.get(owner, TRACKER_PROVIDER)? {
            Some(credential) => credential,
            None => return Ok(ConnectionStatus::NotConnected),
        };

        let url = format!(
            "{}/rest/api/3/myself",
            self.config.site_api_base(&credential.site_id)
        );

        let outcome = self
            .executor
            .execute(credential, |token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .header(header::CONTENT_TYPE, "application/json")
            })
            .await?;

        match outcome {
            ExecuteOutcome::ReconnectRequired => {
                // Idempotent; the executor already discarded the record.
                self.store.delete(owner, TRACKER_PROVIDER)?;
                Ok(ConnectionStatus::Expired)
            }
            ExecuteOutcome::Completed {
                response,
                credential,
            } => {
                let status = response.status();
                if status.is_success() {
                    Ok(ConnectionStatus::Connected { credential })
                } else {
                    warn!(
                        target: "bugbridge.probe",
                        owner,
                        status = status.as_u16(),
                        "identity probe returned non-auth failure",
                    );
                    Err(ProbeError::Unhealthy {
                        status: status.as_u16(),
                    })
                }
            }
        }
    }
}

/// Probe failures that are not a verdict on the credential.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The identity endpoint answered with a non-auth error; the
    /// credential is left untouched.
    #[error("identity probe failed with status {status}")]
    Unhealthy { status: u16 },
    #[error(transparent)]
    Execute(#[from] ExecuteError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
