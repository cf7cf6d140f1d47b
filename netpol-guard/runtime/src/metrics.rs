use kube::core::admission::Operation;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct AdmissionMetrics {
    decisions: Family<DecisionLabels, Counter>,
    lookup_failures: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct DecisionLabels {
    operation: &'static str,
    decision: &'static str,
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let decisions = Family::<DecisionLabels, Counter>::default();
        reg.register(
            "decisions",
            "Total number of admission reviews evaluated, by operation and decision",
            decisions.clone(),
        );

        let lookup_failures = Counter::default();
        reg.register(
            "lookup_failures",
            "Total number of NetworkPolicy lookups that failed or timed out",
            lookup_failures.clone(),
        );

        Self {
            decisions,
            lookup_failures,
        }
    }

    pub(crate) fn record(&self, operation: &Operation, allowed: bool) {
        self.decisions
            .get_or_create(&DecisionLabels {
                operation: operation_name(operation),
                decision: if allowed { "allow" } else { "deny" },
            })
            .inc();
    }

    pub(crate) fn record_lookup_failure(&self) {
        self.lookup_failures.inc();
    }
}

fn operation_name(op: &Operation) -> &'static str {
    match op {
        Operation::Create => "create",
        Operation::Update => "update",
        Operation::Delete => "delete",
        Operation::Connect => "connect",
    }
}
