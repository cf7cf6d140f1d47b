use crate::labels::Selector;
use anyhow::Result;
use async_trait::async_trait;

/// A NetworkPolicy reduced to the selectors that bind pod labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkPolicy {
    pub name: String,
    pub namespace: String,
    pub pod_selector: Selector,
    pub ingress: Vec<IngressRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct IngressRule {
    pub from: Vec<Selector>,
}

// === impl NetworkPolicy ===

impl NetworkPolicy {
    /// All selectors that reference pod labels: the policy's own pod
    /// selector followed by each ingress rule's "from" selectors, in rule
    /// order.
    pub fn selectors(&self) -> impl Iterator<Item = &Selector> {
        std::iter::once(&self.pod_selector).chain(self.ingress.iter().flat_map(|r| r.from.iter()))
    }
}

/// Reads the NetworkPolicies currently visible in a namespace.
///
/// Implementations must not cache across calls: admission decisions gate
/// cluster mutations and must see the latest policy state.
#[async_trait]
pub trait NetworkPolicyAccessor {
    async fn list_policies(&self, namespace: &str) -> Result<Vec<NetworkPolicy>>;
}
