pub mod credential_store;
pub mod fs;
pub mod memory;

pub use credential_store::{CredentialStore, StoreError};
pub use fs::FsCredentialStore;
pub use memory::InMemoryCredentialStore;
