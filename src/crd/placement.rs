//! Placement Custom Resource Definition
//!
//! The placement resource is the externally supplied decision source. The
//! operator consumes it read-only: its status carries the list of member
//! clusters the add-on should be deployed to.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a placement (opaque to this operator)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "spyglass.dev",
    version = "v1alpha1",
    kind = "Placement",
    plural = "placements",
    status = "PlacementStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSpec {
    /// Free-form selector description, evaluated by the external placement
    /// engine, not by this operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_selector: Option<serde_json::Value>,
}

/// Placement decisions computed by the external placement engine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementStatus {
    /// Selected member clusters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<PlacementDecision>,
}

/// One selected member cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementDecision {
    /// Member cluster name
    pub cluster_name: String,

    /// Hub namespace dedicated to the member cluster
    pub cluster_namespace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_deserialize_from_camel_case() {
        let status: PlacementStatus = serde_json::from_str(
            r#"{"decisions": [{"clusterName": "east-1", "clusterNamespace": "member-east-1"}]}"#,
        )
        .unwrap();
        assert_eq!(status.decisions.len(), 1);
        assert_eq!(status.decisions[0].cluster_name, "east-1");
        assert_eq!(status.decisions[0].cluster_namespace, "member-east-1");
    }
}
