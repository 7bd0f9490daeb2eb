//! WorkBundle Custom Resource Definition
//!
//! A work bundle is the complete declarative object set shipped to one
//! member. The canonical bundle name is the member namespace plus the fixed
//! `-observability` suffix; anything else stored under the ownership label
//! is treated as corrupt and deleted by the convergence engine.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a per-member work bundle
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "spyglass.dev",
    version = "v1alpha1",
    kind = "WorkBundle",
    plural = "workbundles",
    shortname = "wb",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkBundleSpec {
    /// Ordered manifest payloads applied on the member cluster.
    ///
    /// Stored untyped: the hub does not interpret member-side objects beyond
    /// producing them, and members may run API versions the hub has no
    /// types for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundle_spec_preserves_manifest_order() {
        let spec = WorkBundleSpec {
            manifests: vec![
                json!({"kind": "Namespace", "metadata": {"name": "spyglass-addon"}}),
                json!({"kind": "ServiceAccount", "metadata": {"name": "addon-agent"}}),
            ],
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["manifests"][0]["kind"], "Namespace");
        assert_eq!(json["manifests"][1]["kind"], "ServiceAccount");
    }

    #[test]
    fn specs_with_identical_manifests_compare_equal() {
        let a = WorkBundleSpec {
            manifests: vec![json!({"kind": "Namespace"})],
        };
        let b = WorkBundleSpec {
            manifests: vec![json!({"kind": "Namespace"})],
        };
        assert_eq!(a, b);

        let c = WorkBundleSpec {
            manifests: vec![json!({"kind": "Secret"})],
        };
        assert_ne!(a, c);
    }
}
