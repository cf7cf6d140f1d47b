use crate::{labels::Labels, netpol::NetworkPolicy};
use anyhow::{anyhow, Error};

/// The verdict for a single admission request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

/// Which conflict semantics the detector applies.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum EnforcementMode {
    /// Deny an update that changes the value of a label while a selector
    /// depends on the old value. Creation is always admitted.
    #[default]
    ValueChange,

    /// Deny creation or update of any pod whose resulting labels satisfy a
    /// selector.
    SelectorMatch,
}

// === impl Decision ===

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

// === impl EnforcementMode ===

impl std::str::FromStr for EnforcementMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "value-change" => Ok(Self::ValueChange),
            "selector-match" => Ok(Self::SelectorMatch),
            s => Err(anyhow!("invalid mode: {:?}", s)),
        }
    }
}

impl std::fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ValueChange => "value-change".fmt(f),
            Self::SelectorMatch => "selector-match".fmt(f),
        }
    }
}

/// Decides whether a pod's label state may be admitted against the
/// namespace's NetworkPolicies.
///
/// Pure: no I/O, no shared state. The label maps iterate in key order and
/// policies are scanned in sequence order, so identical inputs always
/// produce the identical decision.
pub fn decide(
    mode: EnforcementMode,
    old: Option<&Labels>,
    new: &Labels,
    policies: &[NetworkPolicy],
) -> Decision {
    match mode {
        EnforcementMode::ValueChange => value_change(old, new, policies),
        EnforcementMode::SelectorMatch => selector_match(new, policies),
    }
}

fn value_change(old: Option<&Labels>, new: &Labels, policies: &[NetworkPolicy]) -> Decision {
    // Creation: no old value ever satisfied a selector, so nothing is
    // frozen.
    let old = match old {
        Some(old) => old,
        None => return Decision::Allow,
    };

    // Keys present in both snapshots whose value changed. Added and removed
    // keys never violate: a selector freezes a label only while the label
    // currently holds the value the selector matched.
    let changed = old
        .iter()
        .filter_map(|(k, v)| match new.get(k) {
            Some(n) if n != v.as_str() => Some((k.as_str(), v.as_str())),
            _ => None,
        })
        .collect::<Vec<_>>();
    if changed.is_empty() {
        return Decision::Allow;
    }

    for policy in policies {
        for selector in policy.selectors() {
            for &(key, value) in &changed {
                if selector.pins(key, value) {
                    return Decision::Deny(format!(
                        "label '{key}' is governed by NetworkPolicy '{}'; value change not permitted",
                        policy.name
                    ));
                }
            }
        }
    }

    Decision::Allow
}

fn selector_match(new: &Labels, policies: &[NetworkPolicy]) -> Decision {
    for policy in policies {
        if policy.selectors().any(|s| s.matches(new)) {
            return Decision::Deny(format!(
                "labels satisfy a selector of NetworkPolicy '{}'",
                policy.name
            ));
        }
    }

    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        labels::{Expression, Operator, Selector},
        netpol::IngressRule,
    };

    fn policy(name: &str, pod_selector: Selector, ingress: Vec<IngressRule>) -> NetworkPolicy {
        NetworkPolicy {
            name: name.to_string(),
            namespace: "ns1".to_string(),
            pod_selector,
            ingress,
        }
    }

    fn from_rule(selectors: Vec<Selector>) -> IngressRule {
        IngressRule { from: selectors }
    }

    #[test]
    fn update_changing_selected_value_is_denied() {
        // Scenario A: np1 selects tier=frontend; the update moves tier to
        // backend.
        let policies = vec![policy(
            "np1",
            Selector::from_iter(Some(("tier", "frontend"))),
            vec![],
        )];
        let old = Labels::from_iter(Some(("tier", "frontend")));
        let new = Labels::from_iter(Some(("tier", "backend")));

        match decide(EnforcementMode::ValueChange, Some(&old), &new, &policies) {
            Decision::Deny(reason) => {
                assert!(reason.contains("np1"), "reason must name the policy: {reason}");
                assert!(reason.contains("tier"), "reason must name the label: {reason}");
            }
            Decision::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn unchanged_value_with_added_key_is_allowed() {
        // Scenario B: the governed label keeps its value; a brand-new key is
        // irrelevant.
        let policies = vec![policy(
            "np1",
            Selector::default(),
            vec![from_rule(vec![Selector::from_iter(Some((
                "role", "trusted",
            )))])],
        )];
        let old = Labels::from_iter(Some(("role", "trusted")));
        let new = Labels::from_iter(vec![("role", "trusted"), ("extra", "x")]);

        assert_eq!(
            decide(EnforcementMode::ValueChange, Some(&old), &new, &policies),
            Decision::Allow
        );
    }

    #[test]
    fn no_policies_allows_any_change() {
        // Scenario C.
        let old = Labels::from_iter(Some(("tier", "frontend")));
        let new = Labels::from_iter(Some(("tier", "backend")));

        assert_eq!(
            decide(EnforcementMode::ValueChange, Some(&old), &new, &[]),
            Decision::Allow
        );
    }

    #[test]
    fn create_is_allowed_even_when_labels_match_a_selector() {
        // Scenario D: default mode never blocks scheduling a pod into a
        // policy's selection.
        let policies = vec![policy(
            "np1",
            Selector::from_iter(Some(("tier", "frontend"))),
            vec![],
        )];
        let new = Labels::from_iter(Some(("tier", "frontend")));

        assert_eq!(
            decide(EnforcementMode::ValueChange, None, &new, &policies),
            Decision::Allow
        );
    }

    #[test]
    fn ingress_from_selector_freezes_the_old_value() {
        let policies = vec![policy(
            "allow-trusted",
            Selector::from_iter(Some(("app", "api"))),
            vec![from_rule(vec![Selector::from_iter(Some((
                "role", "trusted",
            )))])],
        )];
        let old = Labels::from_iter(Some(("role", "trusted")));
        let new = Labels::from_iter(Some(("role", "admin")));

        match decide(EnforcementMode::ValueChange, Some(&old), &new, &policies) {
            Decision::Deny(reason) => {
                assert!(reason.contains("allow-trusted"));
                assert!(reason.contains("role"));
            }
            Decision::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn change_of_unselected_value_is_allowed() {
        // The selector names the key but pinned a different value; the old
        // value never participated in the match.
        let policies = vec![policy(
            "np1",
            Selector::from_iter(Some(("tier", "frontend"))),
            vec![],
        )];
        let old = Labels::from_iter(Some(("tier", "backend")));
        let new = Labels::from_iter(Some(("tier", "cache")));

        assert_eq!(
            decide(EnforcementMode::ValueChange, Some(&old), &new, &policies),
            Decision::Allow
        );
    }

    #[test]
    fn removed_key_is_allowed() {
        let policies = vec![policy(
            "np1",
            Selector::from_iter(Some(("tier", "frontend"))),
            vec![],
        )];
        let old = Labels::from_iter(Some(("tier", "frontend")));
        let new = Labels::default();

        assert_eq!(
            decide(EnforcementMode::ValueChange, Some(&old), &new, &policies),
            Decision::Allow
        );
    }

    #[test]
    fn in_expression_freezes_listed_values() {
        let selector = Selector::from_iter(Some(Expression {
            key: "tier".to_string(),
            operator: Operator::In,
            values: ["frontend".to_string(), "canary".to_string()]
                .into_iter()
                .collect(),
        }));
        let policies = vec![policy("np-expr", selector, vec![])];
        let old = Labels::from_iter(Some(("tier", "canary")));
        let new = Labels::from_iter(Some(("tier", "backend")));

        match decide(EnforcementMode::ValueChange, Some(&old), &new, &policies) {
            Decision::Deny(reason) => assert!(reason.contains("np-expr")),
            Decision::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn decision_is_stable_across_repetition_and_policy_order() {
        // Only np-hit pins the changed value, so reordering the sequence
        // must not change the verdict or its reason.
        let hit = policy("np-hit", Selector::from_iter(Some(("tier", "frontend"))), vec![]);
        let miss = policy("np-miss", Selector::from_iter(Some(("app", "api"))), vec![]);
        let old = Labels::from_iter(Some(("tier", "frontend")));
        let new = Labels::from_iter(Some(("tier", "backend")));

        let forward = decide(
            EnforcementMode::ValueChange,
            Some(&old),
            &new,
            &[hit.clone(), miss.clone()],
        );
        let reversed = decide(EnforcementMode::ValueChange, Some(&old), &new, &[miss, hit]);
        assert_eq!(forward, reversed);

        for _ in 0..3 {
            let again = decide(
                EnforcementMode::ValueChange,
                Some(&old),
                &new,
                std::slice::from_ref(&policy(
                    "np-hit",
                    Selector::from_iter(Some(("tier", "frontend"))),
                    vec![],
                )),
            );
            assert_eq!(forward, again);
        }
    }

    #[test]
    fn selector_match_mode_denies_matching_labels() {
        let policies = vec![policy(
            "np1",
            Selector::from_iter(Some(("tier", "frontend"))),
            vec![],
        )];
        let new = Labels::from_iter(Some(("tier", "frontend")));

        match decide(EnforcementMode::SelectorMatch, None, &new, &policies) {
            Decision::Deny(reason) => assert!(reason.contains("np1")),
            Decision::Allow => panic!("expected denial"),
        }

        let other = Labels::from_iter(Some(("tier", "cache")));
        assert_eq!(
            decide(EnforcementMode::SelectorMatch, None, &other, &policies),
            Decision::Allow
        );
    }

    #[test]
    fn selector_match_mode_empty_selector_matches_everything() {
        let policies = vec![policy("np-all", Selector::default(), vec![])];
        let new = Labels::from_iter(Some(("anything", "at-all")));

        match decide(EnforcementMode::SelectorMatch, None, &new, &policies) {
            Decision::Deny(reason) => assert!(reason.contains("np-all")),
            Decision::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn mode_parses_displayed() {
        for mode in [EnforcementMode::ValueChange, EnforcementMode::SelectorMatch] {
            assert_eq!(
                mode.to_string().parse::<EnforcementMode>().unwrap(),
                mode,
                "failed to parse displayed {:?}",
                mode
            );
        }
        assert!("sometimes".parse::<EnforcementMode>().is_err());
    }
}
