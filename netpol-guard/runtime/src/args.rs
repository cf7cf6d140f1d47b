use crate::{
    admission::{Admission, FailurePolicy},
    core::EnforcementMode,
    k8s::ClusterAccessor,
    metrics::AdmissionMetrics,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "netpol-guard",
    about = "An admission controller guarding NetworkPolicy label selectors"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "netpol_guard=info,warn",
        env = "NETPOL_GUARD_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Conflict semantics applied to pod label changes.
    #[clap(long, default_value = "value-change")]
    enforcement_mode: EnforcementMode,

    /// Verdict to apply when the NetworkPolicy lookup fails.
    #[clap(long, default_value = "closed")]
    failure_policy: FailurePolicy,

    /// Bounds each per-request NetworkPolicy list call.
    #[clap(long, default_value = "5000")]
    lookup_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            enforcement_mode,
            failure_policy,
            lookup_timeout_ms,
        } = self;

        let mut prom = <Registry>::default();
        let metrics = AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(Some(server))
            .build()
            .await?;

        let accessor =
            ClusterAccessor::new(runtime.client(), Duration::from_millis(lookup_timeout_ms));

        info!(mode = %enforcement_mode, failure = %failure_policy, "Serving admission reviews");

        let runtime = runtime.spawn_server(move || {
            Admission::new(
                Arc::new(accessor),
                enforcement_mode,
                failure_policy,
                metrics,
            )
        });

        // Block the main thread on the shutdown signal. Once it fires, wait
        // for the background tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
