use k8s_openapi::{
    api::networking::v1 as api,
    apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement},
};
use kube::ResourceExt;
use netpol_guard_core::{
    labels::{Expression, Operator, Selector},
    IngressRule, NetworkPolicy,
};
use tracing::debug;

/// Reduces a cluster NetworkPolicy to the selectors that bind pod labels.
///
/// Each ingress rule contributes the pod selector of each of its "from"
/// peers; peers carrying only a namespace selector or an IP block place no
/// constraint on pod labels and contribute nothing.
pub(crate) fn network_policy(np: api::NetworkPolicy) -> NetworkPolicy {
    let name = np.name_any();
    let namespace = np.namespace().unwrap_or_default();
    let spec = np.spec.unwrap_or_default();

    let ingress = spec
        .ingress
        .unwrap_or_default()
        .into_iter()
        .map(|rule| IngressRule {
            from: rule
                .from
                .unwrap_or_default()
                .into_iter()
                .filter_map(|peer| peer.pod_selector.map(selector))
                .collect(),
        })
        .collect();

    NetworkPolicy {
        name,
        namespace,
        pod_selector: selector(spec.pod_selector),
        ingress,
    }
}

fn selector(ls: LabelSelector) -> Selector {
    let exprs = ls
        .match_expressions
        .map(|exprs| exprs.into_iter().filter_map(expression).collect());
    Selector::new(ls.match_labels, exprs)
}

fn expression(req: LabelSelectorRequirement) -> Option<Expression> {
    let operator = match req.operator.as_str() {
        "In" => Operator::In,
        "NotIn" => Operator::NotIn,
        op => {
            // Presence operators constrain a key, not a value; they cannot
            // pin a label.
            debug!(key = %req.key, %op, "Ignoring presence-only selector requirement");
            return None;
        }
    };

    Some(Expression {
        key: req.key,
        operator,
        values: req.values.unwrap_or_default().into_iter().collect(),
    })
}
