use thiserror::Error;

use crate::types::Credential;

/// Persistence contract for tracker credentials, keyed by (owner, provider).
///
/// Implementations hold at most one credential per key. `upsert` fully
/// replaces any existing record; `delete` is idempotent. No network I/O
/// happens behind this trait.
pub trait CredentialStore: Send + Sync {
    /// Fetch the credential for the given key, if one is stored.
    fn get(&self, owner: &str, provider: &str) -> Result<Option<Credential>, StoreError>;
    /// Insert or fully overwrite the record for the credential's key.
    fn upsert(&self, credential: &Credential) -> Result<(), StoreError>;
    /// Remove the record for the given key; succeeds when absent.
    fn delete(&self, owner: &str, provider: &str) -> Result<(), StoreError>;
}

/// Errors arising from credential persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid credential key: {0}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
