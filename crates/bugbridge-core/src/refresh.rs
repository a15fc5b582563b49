use std::sync::Arc;

use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    config::TrackerConfig,
    storage::CredentialStore,
    types::{Credential, TokenPair},
};

/// Exchanges a stored refresh token for a rotated token pair.
///
/// One attempt per invocation; the retry policy lives in the request
/// executor. A successful exchange is persisted before this returns, so a
/// concurrent reader always observes the rotated pair.
///
/// Refreshes are serialised per (owner, provider): the provider rotates
/// refresh tokens on every exchange, so two racing refreshes with the same
/// token would invalidate each other. Whoever loses the lock race re-reads
/// the store and adopts the fresh credential without another exchange.
pub struct TokenRefresher<S> {
    config: TrackerConfig,
    http: Client,
    store: Arc<S>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S> TokenRefresher<S>
where
    S: CredentialStore,
{
    pub fn new(config: TrackerConfig, http: Client, store: Arc<S>) -> Self {
        Self {
            config,
            http,
            store,
            locks: DashMap::new(),
        }
    }

    /// Attempt a silent refresh for the given credential.
    ///
    /// Returns the persisted, refreshed credential, or `None` when the
    /// credential cannot be renewed (no refresh token, endpoint rejection,
    /// unusable response). `None` is terminal from the caller's point of
    /// view.
    pub async fn refresh(&self, stale: &Credential) -> Option<Credential> {
        let lock = self.lock_for(stale);
        let _guard = lock.lock().await;

        // Another request may have rotated the pair while we waited.
        let current = match self.store.get(&stale.owner, &stale.provider) {
            Ok(Some(current)) => current,
            Ok(None) => {
                debug!(
                    target: "bugbridge.refresh",
                    owner = stale.owner.as_str(),
                    "credential disappeared before refresh",
                );
                return None;
            }
            Err(err) => {
                warn!(
                    target: "bugbridge.refresh",
                    owner = stale.owner.as_str(),
                    error = %err,
                    "credential lookup failed before refresh",
                );
                return None;
            }
        };
        if current.access_token != stale.access_token {
            debug!(
                target: "bugbridge.refresh",
                owner = stale.owner.as_str(),
                "adopting concurrently refreshed credential",
            );
            return Some(current);
        }

        match self.exchange(&current).await {
            Ok(pair) => {
                let refreshed = current.with_tokens(&pair);
                if let Err(err) = self.store.upsert(&refreshed) {
                    warn!(
                        target: "bugbridge.refresh",
                        owner = stale.owner.as_str(),
                        error = %err,
                        "failed to persist refreshed credential",
                    );
                    return None;
                }
                Some(refreshed)
            }
            Err(err) => {
                warn!(
                    target: "bugbridge.refresh",
                    owner = stale.owner.as_str(),
                    error = %err,
                    "token refresh failed",
                );
                None
            }
        }
    }

    async fn exchange(&self, credential: &Credential) -> Result<TokenPair, RefreshError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(RefreshError::NotRefreshable)?;

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RefreshError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let payload: RefreshResponse = serde_json::from_str(&body)
            .map_err(|err| RefreshError::InvalidResponse(err.to_string()))?;

        match (payload.access_token, payload.refresh_token) {
            (Some(access_token), Some(refresh_token))
                if !access_token.is_empty() && !refresh_token.is_empty() =>
            {
                Ok(TokenPair {
                    access_token,
                    refresh_token,
                })
            }
            _ => Err(RefreshError::InvalidResponse(
                "token response missing rotated token pair".into(),
            )),
        }
    }

    fn lock_for(&self, credential: &Credential) -> Arc<Mutex<()>> {
        let key = format!("{}/{}", credential.provider, credential.owner);
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Reasons a single refresh attempt can fail.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("credential has no refresh token")]
    NotRefreshable,
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}
