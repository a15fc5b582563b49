use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
    config::TrackerConfig,
    state::{StateClaims, StateError, StateKey},
    storage::{CredentialStore, StoreError},
    types::{Credential, TRACKER_PROVIDER},
};

/// Orchestrates connect (authorization-code exchange) and disconnect.
pub struct ConnectionLifecycle<S> {
    config: TrackerConfig,
    http: Client,
    store: Arc<S>,
    state_key: StateKey,
}

impl<S> ConnectionLifecycle<S>
where
    S: CredentialStore,
{
    pub fn new(config: TrackerConfig, http: Client, store: Arc<S>, state_key: StateKey) -> Self {
        Self {
            config,
            http,
            store,
            state_key,
        }
    }

    /// Build the provider authorization URL for an owner.
    ///
    /// The `state` parameter carries a sealed claims blob; it is the only
    /// thing tying the provider round-trip back to the owner.
    pub fn begin_authorization(&self, owner: &str) -> Result<Url, LifecycleError> {
        let state = StateClaims::new(owner).seal(&self.state_key)?;

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|err| LifecycleError::Config(err.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(audience) = &self.config.audience {
                pairs.append_pair("audience", audience);
            }
            pairs
                .append_pair("client_id", &self.config.client_id)
                .append_pair("scope", &self.config.scope_param())
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("state", &state)
                .append_pair("response_type", "code")
                // Force the account picker so a stale provider session
                // cannot silently bind the wrong account.
                .append_pair("prompt", "select_account consent");
        }

        Ok(url)
    }

    /// Complete the authorization round-trip.
    ///
    /// Validates the state blob, exchanges the code, resolves the workspace
    /// the grant can reach, and stores the credential. Nothing is persisted
    /// unless every step succeeds.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Credential, LifecycleError> {
        let claims = StateClaims::open(&self.state_key, state)?;
        let grant = self.exchange_code(code).await?;
        let site = self.resolve_site(&grant.access_token).await?;

        let credential = Credential::new(
            claims.owner,
            site.id,
            Some(site.url),
            grant.access_token,
            grant.refresh_token,
        );
        self.store.upsert(&credential)?;

        info!(
            target: "bugbridge.lifecycle",
            owner = credential.owner.as_str(),
            site_id = credential.site_id.as_str(),
            "tracker connection established",
        );
        Ok(credential)
    }

    /// Drop the stored credential; succeeds even when none exists.
    pub fn disconnect(&self, owner: &str) -> Result<(), StoreError> {
        self.store.delete(owner, TRACKER_PROVIDER)
    }

    async fn exchange_code(&self, code: &str) -> Result<InitialGrant, LifecycleError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .json(&json!({
                "grant_type": "authorization_code",
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "code": code,
                "redirect_uri": self.config.redirect_uri,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(LifecycleError::ExchangeRejected {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenExchangeResponse = serde_json::from_str(&body)
            .map_err(|err| LifecycleError::InvalidResponse(err.to_string()))?;
        match payload.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(InitialGrant {
                access_token,
                refresh_token: payload.refresh_token.filter(|token| !token.is_empty()),
            }),
            _ => Err(LifecycleError::InvalidResponse(
                "token response missing access_token".into(),
            )),
        }
    }

    async fn resolve_site(&self, access_token: &str) -> Result<AccessibleSite, LifecycleError> {
        let response = self
            .http
            .get(self.config.accessible_resources_url())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(LifecycleError::InvalidResponse(format!(
                "accessible-resources returned {status}"
            )));
        }

        let sites: Vec<AccessibleSite> = serde_json::from_str(&body)
            .map_err(|err| LifecycleError::InvalidResponse(err.to_string()))?;
        sites.into_iter().next().ok_or(LifecycleError::NoSites)
    }
}

struct InitialGrant {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessibleSite {
    id: String,
    url: String,
}

/// Failures of the connect flow; none of them leave a partial credential.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("state validation failed: {0}")]
    State(#[from] StateError),
    #[error("code exchange rejected with {status}: {body}")]
    ExchangeRejected { status: u16, body: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("grant has no accessible workspace")]
    NoSites,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("configuration error: {0}")]
    Config(String),
}
