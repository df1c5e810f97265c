use async_trait::async_trait;
use std::sync::Arc;

use crate::tools::Tool;

/// The slice of the host's capability registry the forge is allowed to use.
///
/// The forge only checks for existing identities and adds or replaces
/// entries; it never enumerates or invokes what is registered.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    async fn exists(&self, identity: &str) -> bool;

    /// Insert, replacing any entry under the same identity
    async fn register(&self, identity: &str, capability: Arc<dyn Tool>);

    /// Insert only if `identity` is free. Returns whether it was inserted.
    ///
    /// Implementations should make the check and the insert one atomic step;
    /// this default is only safe under a single writer.
    async fn register_if_absent(&self, identity: &str, capability: Arc<dyn Tool>) -> bool {
        if self.exists(identity).await {
            return false;
        }
        self.register(identity, capability).await;
        true
    }
}
