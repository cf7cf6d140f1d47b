#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use netpol_guard_core as core;
pub use netpol_guard_k8s as k8s;

mod admission;
mod args;
mod metrics;

pub use self::{
    admission::{Admission, FailurePolicy},
    args::Args,
    metrics::AdmissionMetrics,
};
