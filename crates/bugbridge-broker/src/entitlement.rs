use std::collections::HashSet;

use async_trait::async_trait;

/// Paid-tier gate evaluated before any tracker operation.
///
/// The broker trusts the verdict as a pre-condition; how entitlement is
/// decided (billing, plans, beta flags) is the deployment's business.
#[async_trait]
pub trait EntitlementGate: Send + Sync {
    async fn allows(&self, owner: &str) -> bool;
}

/// Gate that admits everyone. Default for development setups.
pub struct AllowAllGate;

#[async_trait]
impl EntitlementGate for AllowAllGate {
    async fn allows(&self, _owner: &str) -> bool {
        true
    }
}

/// Gate backed by a fixed set of entitled owners.
pub struct AllowlistGate {
    owners: HashSet<String>,
}

impl AllowlistGate {
    pub fn new(owners: impl IntoIterator<Item = String>) -> Self {
        Self {
            owners: owners.into_iter().collect(),
        }
    }
}

#[async_trait]
impl EntitlementGate for AllowlistGate {
    async fn allows(&self, owner: &str) -> bool {
        self.owners.contains(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allowlist_admits_only_listed_owners() {
        let gate = AllowlistGate::new(["pro@example.com".to_owned()]);
        assert!(gate.allows("pro@example.com").await);
        assert!(!gate.allows("free@example.com").await);
    }

    #[tokio::test]
    async fn allow_all_admits_everyone() {
        assert!(AllowAllGate.allows("anyone@example.com").await);
    }
}
