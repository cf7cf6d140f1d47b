#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod accessor;
mod netpol;

pub use self::accessor::ClusterAccessor;
pub use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec,
};
pub use kube::{api::ObjectMeta, Client, ResourceExt};
