//! Placement resolution
//!
//! Turns the externally supplied placement decision list into the
//! authoritative set of member targets for the current convergence pass.
//! Targets are ephemeral: they are derived fresh every pass and never
//! persisted.

use tracing::warn;

use crate::crd::Placement;

/// One fleet member selected for add-on deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberTarget {
    /// Member cluster name
    pub name: String,
    /// Hub namespace dedicated to the member
    pub namespace: String,
}

/// Resolve the authoritative target set from a placement resource
///
/// Decisions with a blank name or namespace are dropped, and duplicate
/// namespaces keep their first occurrence: at most one target (and hence
/// one bundle) may exist per member namespace. Input order is preserved.
pub fn resolve_targets(placement: &Placement) -> Vec<MemberTarget> {
    let mut seen = std::collections::HashSet::new();
    let mut targets = Vec::new();

    let decisions = placement
        .status
        .as_ref()
        .map(|s| s.decisions.as_slice())
        .unwrap_or_default();

    for decision in decisions {
        if decision.cluster_name.is_empty() || decision.cluster_namespace.is_empty() {
            warn!(
                name = %decision.cluster_name,
                namespace = %decision.cluster_namespace,
                "skipping placement decision with blank fields"
            );
            continue;
        }
        if !seen.insert(decision.cluster_namespace.clone()) {
            warn!(
                namespace = %decision.cluster_namespace,
                "skipping duplicate placement decision"
            );
            continue;
        }
        targets.push(MemberTarget {
            name: decision.cluster_name.clone(),
            namespace: decision.cluster_namespace.clone(),
        });
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PlacementDecision, PlacementSpec, PlacementStatus};
    use kube::core::ObjectMeta;

    fn placement_with(decisions: Vec<PlacementDecision>) -> Placement {
        Placement {
            metadata: ObjectMeta {
                name: Some(crate::PLACEMENT_NAME.to_string()),
                namespace: Some(crate::DEFAULT_HUB_NAMESPACE.to_string()),
                ..Default::default()
            },
            spec: PlacementSpec::default(),
            status: Some(PlacementStatus { decisions }),
        }
    }

    fn decision(name: &str, namespace: &str) -> PlacementDecision {
        PlacementDecision {
            cluster_name: name.to_string(),
            cluster_namespace: namespace.to_string(),
        }
    }

    #[test]
    fn resolves_each_decision_to_one_target() {
        let placement = placement_with(vec![
            decision("east-1", "member-east-1"),
            decision("west-1", "member-west-1"),
        ]);

        let targets = resolve_targets(&placement);
        assert_eq!(
            targets,
            vec![
                MemberTarget {
                    name: "east-1".to_string(),
                    namespace: "member-east-1".to_string()
                },
                MemberTarget {
                    name: "west-1".to_string(),
                    namespace: "member-west-1".to_string()
                },
            ]
        );
    }

    #[test]
    fn duplicate_namespaces_keep_first_occurrence() {
        let placement = placement_with(vec![
            decision("east-1", "member-east-1"),
            decision("east-1-copy", "member-east-1"),
        ]);

        let targets = resolve_targets(&placement);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "east-1");
    }

    #[test]
    fn blank_decisions_are_dropped() {
        let placement = placement_with(vec![
            decision("", "member-east-1"),
            decision("west-1", ""),
            decision("ok", "member-ok"),
        ]);

        let targets = resolve_targets(&placement);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].namespace, "member-ok");
    }

    #[test]
    fn missing_status_yields_empty_target_set() {
        let mut placement = placement_with(vec![]);
        placement.status = None;
        assert!(resolve_targets(&placement).is_empty());
    }
}
