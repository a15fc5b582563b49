use std::{collections::HashMap, sync::Mutex};

use super::credential_store::{CredentialStore, StoreError};
use crate::types::Credential;

type CredentialKey = (String, String);

/// In-memory credential store, handy for tests and single-process setups.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: Mutex<HashMap<CredentialKey, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self, owner: &str, provider: &str) -> Result<Option<Credential>, StoreError> {
        let inner = self.inner.lock().expect("credential store poisoned");
        Ok(inner.get(&(owner.to_owned(), provider.to_owned())).cloned())
    }

    fn upsert(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("credential store poisoned");
        inner.insert(
            (credential.owner.clone(), credential.provider.clone()),
            credential.clone(),
        );
        Ok(())
    }

    fn delete(&self, owner: &str, provider: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("credential store poisoned");
        inner.remove(&(owner.to_owned(), provider.to_owned()));
        Ok(())
    }
}
