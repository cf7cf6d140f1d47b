#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod detect;
pub mod labels;
pub mod netpol;

pub use self::{
    detect::{decide, Decision, EnforcementMode},
    labels::{Labels, Selector},
    netpol::{IngressRule, NetworkPolicy, NetworkPolicyAccessor},
};
