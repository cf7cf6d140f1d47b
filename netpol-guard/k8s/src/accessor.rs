use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use kube::{api::ListParams, Api, Client};
use netpol_guard_core as core;
use tokio::time;

/// Lists NetworkPolicies through the cluster API.
///
/// Policies are read fresh on every call so that decisions never act on
/// stale selector state; nothing is cached between requests. Each list call
/// is bounded by `lookup_timeout` and fails rather than blocking the
/// admission request indefinitely.
#[derive(Clone)]
pub struct ClusterAccessor {
    client: Client,
    lookup_timeout: time::Duration,
}

// === impl ClusterAccessor ===

impl ClusterAccessor {
    pub fn new(client: Client, lookup_timeout: time::Duration) -> Self {
        Self {
            client,
            lookup_timeout,
        }
    }
}

#[async_trait]
impl core::NetworkPolicyAccessor for ClusterAccessor {
    async fn list_policies(&self, namespace: &str) -> Result<Vec<core::NetworkPolicy>> {
        let api = Api::<crate::NetworkPolicy>::namespaced(self.client.clone(), namespace);
        let list = time::timeout(self.lookup_timeout, api.list(&ListParams::default()))
            .await
            .map_err(|_| {
                anyhow!(
                    "NetworkPolicy list in namespace '{namespace}' timed out after {:?}",
                    self.lookup_timeout
                )
            })?
            .with_context(|| format!("failed to list NetworkPolicies in namespace '{namespace}'"))?;

        Ok(list
            .items
            .into_iter()
            .map(super::netpol::network_policy)
            .collect())
    }
}
