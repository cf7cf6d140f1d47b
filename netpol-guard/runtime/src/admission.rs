use crate::metrics::AdmissionMetrics;
use anyhow::{anyhow, Error as Anyhow};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    core::{admission::Operation, DynamicObject},
    Resource, ResourceExt,
};
use netpol_guard_core::{decide, Decision, EnforcementMode, Labels, NetworkPolicyAccessor};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Clone)]
pub struct Admission {
    accessor: Arc<dyn NetworkPolicyAccessor + Send + Sync>,
    mode: EnforcementMode,
    failure_policy: FailurePolicy,
    metrics: AdmissionMetrics,
}

/// What to do when the NetworkPolicy lookup fails: enforcement cannot be
/// verified, so either refuse the mutation or wave it through.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    #[default]
    Closed,
    Open,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl FailurePolicy ===

impl std::str::FromStr for FailurePolicy {
    type Err = Anyhow;

    fn from_str(s: &str) -> Result<Self, Anyhow> {
        match s {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            s => Err(anyhow!("invalid failure policy: {:?}", s)),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => "closed".fmt(f),
            Self::Open => "open".fmt(f),
        }
    }
}

// === impl Admission ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: Review = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req).await
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new(
        accessor: Arc<dyn NetworkPolicyAccessor + Send + Sync>,
        mode: EnforcementMode,
        failure_policy: FailurePolicy,
        metrics: AdmissionMetrics,
    ) -> Self {
        Self {
            accessor,
            mode,
            failure_policy,
            metrics,
        }
    }

    async fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        let operation = req.operation.clone();
        let metrics = self.metrics.clone();
        let rsp = self.evaluate(req).await;
        metrics.record(&operation, rsp.allowed);
        rsp
    }

    async fn evaluate(self, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);

        if !is_kind::<Pod>(&req) {
            return rsp.deny(format!(
                "unsupported resource type: {}.{}.{}",
                req.kind.group, req.kind.version, req.kind.kind
            ));
        }

        // Neither operation carries a label mutation to evaluate.
        if matches!(req.operation, Operation::Delete | Operation::Connect) {
            return rsp;
        }

        // In value-change mode a creation is admitted unconditionally, so a
        // policy lookup failure must not refuse it.
        if req.operation == Operation::Create && self.mode == EnforcementMode::ValueChange {
            return rsp;
        }

        let obj = match req.object.as_ref() {
            Some(obj) => obj,
            None => return rsp.deny("admission request missing 'object'"),
        };
        let name = obj.name_any();
        let ns = match req.namespace.clone().or_else(|| obj.namespace()) {
            Some(ns) => ns,
            None => return rsp.deny("no 'namespace' field set on pod"),
        };
        let labels = Labels::from(obj.labels().clone());

        let old_labels = if req.operation == Operation::Update {
            match req.old_object.as_ref() {
                Some(old) => Some(Labels::from(old.labels().clone())),
                None => {
                    return rsp.deny(
                        "UPDATE admission request missing 'oldObject'; \
                         label changes cannot be evaluated",
                    )
                }
            }
        } else {
            None
        };

        let policies = match self.accessor.list_policies(&ns).await {
            Ok(policies) => policies,
            Err(error) => {
                warn!(%error, %ns, %name, "Failed to list NetworkPolicies");
                self.metrics.record_lookup_failure();
                return match self.failure_policy {
                    FailurePolicy::Closed => rsp.deny(format!(
                        "could not verify NetworkPolicy label constraints: {error}"
                    )),
                    FailurePolicy::Open => rsp,
                };
            }
        };

        match decide(self.mode, old_labels.as_ref(), &labels, &policies) {
            Decision::Allow => {
                debug!(%ns, %name, "Admitting pod");
                rsp
            }
            Decision::Deny(reason) => {
                info!(%ns, %name, %reason, "Denying pod");
                rsp.deny(reason)
            }
        }
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}
