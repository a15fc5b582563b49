//! Core primitives for the bugbridge tracker integration.
//!
//! The central piece is [`RequestExecutor`], which wraps every outbound
//! tracker call with the refresh-and-retry protocol: try the stored access
//! token, refresh once on 401/403, retry once, give up (and clean up) if
//! the retry still fails authorization.

pub mod config;
pub mod executor;
pub mod lifecycle;
pub mod probe;
pub mod refresh;
pub mod state;
pub mod storage;
pub mod types;

pub use config::TrackerConfig;
pub use executor::{ExecuteError, ExecuteOutcome, RequestExecutor};
pub use lifecycle::{ConnectionLifecycle, LifecycleError};
pub use probe::{ConnectionStatus, HealthProbe, ProbeError};
pub use refresh::{RefreshError, TokenRefresher};
pub use state::{StateClaims, StateError, StateKey};
pub use storage::{CredentialStore, FsCredentialStore, InMemoryCredentialStore, StoreError};
pub use types::{Credential, TRACKER_PROVIDER, TokenPair};
