use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Provider slug for the single tracker this service integrates with.
pub const TRACKER_PROVIDER: &str = "jira";

/// Stored OAuth credential for one (owner, provider) pair.
///
/// The access token is the short-lived bearer secret used on API calls;
/// the refresh token, when present, can be exchanged for a rotated pair.
/// A credential without a refresh token cannot be silently renewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub owner: String,
    pub provider: String,
    /// Provider-assigned workspace id, required to build API URLs.
    pub site_id: String,
    /// Human-facing site URL, used for `browse` links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Credential {
    /// Build a fresh credential as produced by the authorization-code flow.
    pub fn new(
        owner: impl Into<String>,
        site_id: impl Into<String>,
        site_url: Option<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            owner: owner.into(),
            provider: TRACKER_PROVIDER.to_owned(),
            site_id: site_id.into(),
            site_url,
            access_token: access_token.into(),
            refresh_token,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a rotated token pair into this credential.
    ///
    /// Only the token material and `updated_at` change; owner, provider and
    /// site identity are preserved.
    pub fn with_tokens(&self, pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            refresh_token: Some(pair.refresh_token.clone()),
            updated_at: OffsetDateTime::now_utc(),
            ..self.clone()
        }
    }

    /// Whether a silent refresh is possible at all.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

/// Rotated token pair returned by a successful refresh.
///
/// The provider rotates refresh tokens on every exchange, so both halves
/// are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
