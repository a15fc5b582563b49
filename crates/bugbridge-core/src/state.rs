use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const MIN_KEY_LEN: usize = 16;

/// Authorization round-trips older than this are rejected on return.
const STATE_MAX_AGE_SECS: u64 = 600;

/// HMAC key used to seal and verify OAuth `state` payloads.
pub struct StateKey {
    key: Vec<u8>,
}

impl StateKey {
    pub fn new(key: &[u8]) -> Result<Self, StateError> {
        if key.len() < MIN_KEY_LEN {
            return Err(StateError::InvalidKey);
        }
        Ok(Self { key: key.to_vec() })
    }

    /// Seal a payload under a context label, producing an opaque token.
    pub fn seal(&self, context: &str, payload: &str) -> Result<String, StateError> {
        let tag = self.tag(context, payload)?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verify a sealed token and recover the payload.
    pub fn open(&self, context: &str, token: &str) -> Result<String, StateError> {
        let (payload_b64, tag_b64) = token.split_once('.').ok_or(StateError::Malformed)?;
        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64.as_bytes())
            .map_err(|_| StateError::Malformed)?;
        let payload = String::from_utf8(payload_bytes).map_err(|_| StateError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64.as_bytes())
            .map_err(|_| StateError::Malformed)?;

        let mac = self.mac(context, &payload)?;
        mac.verify_slice(&tag)
            .map_err(|_| StateError::BadSignature)?;
        Ok(payload)
    }

    fn mac(&self, context: &str, payload: &str) -> Result<HmacSha256, StateError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| StateError::InvalidKey)?;
        mac.update(context.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    fn tag(&self, context: &str, payload: &str) -> Result<Vec<u8>, StateError> {
        Ok(self.mac(context, payload)?.finalize().into_bytes().to_vec())
    }
}

/// Canonical payload embedded in the OAuth `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    pub owner: String,
    pub nonce: String,
    pub ts: u64,
}

impl StateClaims {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            nonce: generate_nonce(),
            ts: current_epoch_seconds(),
        }
    }

    pub fn seal(&self, key: &StateKey) -> Result<String, StateError> {
        key.seal("state", &serde_json::to_string(self)?)
    }

    /// Verify a sealed state token and check it is still fresh.
    pub fn open(key: &StateKey, token: &str) -> Result<Self, StateError> {
        let payload = key.open("state", token)?;
        let claims: StateClaims = serde_json::from_str(&payload)?;

        let now = current_epoch_seconds();
        if claims.ts > now + 60 || now.saturating_sub(claims.ts) > STATE_MAX_AGE_SECS {
            return Err(StateError::Expired);
        }

        Ok(claims)
    }
}

fn generate_nonce() -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, 32)
}

fn current_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Errors from sealing or validating state tokens.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state key material is unusable")]
    InvalidKey,
    #[error("state token is malformed")]
    Malformed,
    #[error("state token signature mismatch")]
    BadSignature,
    #[error("state token expired")]
    Expired,
    #[error("state payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
