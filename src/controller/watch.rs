//! Event predicates and the fixed-key dispatcher
//!
//! Every watched resource kind funnels through the same primitive: a pure
//! predicate deciding whether an object is relevant, composed with a mapper
//! that enqueues the singleton fleet key. All triggering events therefore
//! coalesce onto one logical work item, and at most one convergence pass
//! runs at a time.

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use crate::certs::SERVER_CA_SECRET;
use crate::crd::{ObservabilityAddon, ObservabilityFleet, Placement, WorkBundle};
use crate::{ADDON_NAME, FLEET_NAME, OWNER_LABEL_KEY, OWNER_LABEL_VALUE, PLACEMENT_NAME};

/// The fixed key every triggering event coalesces onto
pub fn fleet_key() -> ObjectRef<ObservabilityFleet> {
    ObjectRef::new(FLEET_NAME)
}

/// Compose a predicate with the fixed-key mapper.
///
/// Returns a mapper suitable for a secondary watch: objects passing the
/// predicate enqueue the singleton fleet key, everything else is dropped.
pub fn enqueue_fleet<K>(
    predicate: impl Fn(&K) -> bool,
) -> impl Fn(K) -> Option<ObjectRef<ObservabilityFleet>> {
    move |obj| predicate(&obj).then(fleet_key)
}

/// Whether an object carries this operator's ownership label
fn has_owner_label(labels: &std::collections::BTreeMap<String, String>) -> bool {
    labels.get(OWNER_LABEL_KEY).map(String::as_str) == Some(OWNER_LABEL_VALUE)
}

/// The placement resource consumed as the decision source
pub fn is_watched_placement(placement: &Placement, hub_namespace: &str) -> bool {
    placement.name_any() == PLACEMENT_NAME
        && placement.namespace().as_deref() == Some(hub_namespace)
}

/// A per-member add-on record owned by this operator
pub fn is_owned_addon(addon: &ObservabilityAddon) -> bool {
    addon.name_any() == ADDON_NAME && has_owner_label(addon.labels())
}

/// A work bundle owned by this operator
pub fn is_owned_bundle(bundle: &WorkBundle) -> bool {
    has_owner_label(bundle.labels())
}

/// The server authority secret, whose rotation must re-embed trust anchors
/// into every member bundle
pub fn is_server_ca_secret(secret: &Secret, hub_namespace: &str) -> bool {
    secret.name_any() == SERVER_CA_SECRET
        && secret.namespace().as_deref() == Some(hub_namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ObservabilityAddonSpec, PlacementSpec, WorkBundleSpec};
    use crate::owner_labels;
    use kube::core::ObjectMeta;

    fn meta(name: &str, namespace: Option<&str>, owned: bool) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(String::from),
            labels: owned.then(owner_labels),
            ..Default::default()
        }
    }

    #[test]
    fn placement_predicate_requires_name_and_namespace() {
        let hub = crate::DEFAULT_HUB_NAMESPACE;
        let watched = Placement {
            metadata: meta(PLACEMENT_NAME, Some(hub), false),
            spec: PlacementSpec::default(),
            status: None,
        };
        assert!(is_watched_placement(&watched, hub));

        let other_name = Placement {
            metadata: meta("something-else", Some(hub), false),
            spec: PlacementSpec::default(),
            status: None,
        };
        assert!(!is_watched_placement(&other_name, hub));

        let other_namespace = Placement {
            metadata: meta(PLACEMENT_NAME, Some("elsewhere"), false),
            spec: PlacementSpec::default(),
            status: None,
        };
        assert!(!is_watched_placement(&other_namespace, hub));
    }

    #[test]
    fn addon_predicate_requires_ownership_label() {
        let owned = ObservabilityAddon {
            metadata: meta(ADDON_NAME, Some("member-1"), true),
            spec: ObservabilityAddonSpec::default(),
            status: None,
        };
        assert!(is_owned_addon(&owned));

        let unowned = ObservabilityAddon {
            metadata: meta(ADDON_NAME, Some("member-1"), false),
            spec: ObservabilityAddonSpec::default(),
            status: None,
        };
        assert!(!is_owned_addon(&unowned));
    }

    #[test]
    fn bundle_predicate_checks_ownership_only() {
        let owned = WorkBundle {
            metadata: meta("member-1-observability", Some("member-1"), true),
            spec: WorkBundleSpec::default(),
        };
        assert!(is_owned_bundle(&owned));

        // Malformed names still enqueue: cleanup is the engine's job
        let malformed = WorkBundle {
            metadata: meta("stray-bundle", Some("member-1"), true),
            spec: WorkBundleSpec::default(),
        };
        assert!(is_owned_bundle(&malformed));
    }

    #[test]
    fn dispatcher_enqueues_the_fixed_fleet_key() {
        let mapper = enqueue_fleet(|bundle: &WorkBundle| is_owned_bundle(bundle));

        let owned = WorkBundle {
            metadata: meta("member-1-observability", Some("member-1"), true),
            spec: WorkBundleSpec::default(),
        };
        let key = mapper(owned).expect("owned bundle should enqueue");
        assert_eq!(key.name, FLEET_NAME);

        let unowned = WorkBundle {
            metadata: meta("member-1-observability", Some("member-1"), false),
            spec: WorkBundleSpec::default(),
        };
        assert!(mapper(unowned).is_none());
    }
}
