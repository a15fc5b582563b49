use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use super::credential_store::{CredentialStore, StoreError};
use crate::types::Credential;

/// Filesystem-backed credential store with an in-memory cache.
///
/// One JSON file per (owner, provider) pair. Owners are base64-encoded in
/// file names, so arbitrary identifiers (e-mail addresses included) never
/// reach the path layer. Writes go through a temp file and an atomic
/// rename, so concurrent upserts never leave a torn record behind.
pub struct FsCredentialStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Credential>>,
}

impl FsCredentialStore {
    /// Create a store rooted at the provided directory.
    pub fn new(base_dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, owner: &str, provider: &str) -> Result<PathBuf, StoreError> {
        Ok(self.base_dir.join(relative_path(owner, provider)?))
    }
}

fn cache_key(owner: &str, provider: &str) -> String {
    format!("{provider}/{owner}")
}

fn relative_path(owner: &str, provider: &str) -> Result<PathBuf, StoreError> {
    if owner.is_empty() {
        return Err(StoreError::InvalidKey("owner must not be empty".into()));
    }
    if provider.is_empty()
        || !provider
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StoreError::InvalidKey(format!(
            "invalid provider slug `{provider}`"
        )));
    }

    let encoded_owner = URL_SAFE_NO_PAD.encode(owner.as_bytes());
    Ok(Path::new(provider).join(format!("{encoded_owner}.json")))
}

impl CredentialStore for FsCredentialStore {
    fn get(&self, owner: &str, provider: &str) -> Result<Option<Credential>, StoreError> {
        if let Some(credential) = self
            .cache
            .read()
            .expect("cache read lock poisoned")
            .get(&cache_key(owner, provider))
            .cloned()
        {
            return Ok(Some(credential));
        }

        let fs_path = self.path_for(owner, provider)?;
        match fs::read(fs_path) {
            Ok(bytes) => {
                let credential: Credential = serde_json::from_slice(&bytes)?;
                self.cache
                    .write()
                    .expect("cache write lock poisoned")
                    .insert(cache_key(owner, provider), credential.clone());
                Ok(Some(credential))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::from(err)),
        }
    }

    fn upsert(&self, credential: &Credential) -> Result<(), StoreError> {
        let fs_path = self.path_for(&credential.owner, &credential.provider)?;
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename keeps the replace atomic for concurrent readers.
        let payload = serde_json::to_vec_pretty(credential)?;
        let tmp_path = fs_path.with_extension("json.tmp");
        fs::write(&tmp_path, payload)?;
        fs::rename(&tmp_path, &fs_path)?;

        self.cache
            .write()
            .expect("cache write lock poisoned")
            .insert(
                cache_key(&credential.owner, &credential.provider),
                credential.clone(),
            );
        Ok(())
    }

    fn delete(&self, owner: &str, provider: &str) -> Result<(), StoreError> {
        self.cache
            .write()
            .expect("cache write lock poisoned")
            .remove(&cache_key(owner, provider));

        let fs_path = self.path_for(owner, provider)?;
        match fs::remove_file(fs_path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::from(err)),
        }
    }
}
