//! Per-member add-on records and the shared registration
//!
//! Three kinds live here:
//! - [`ObservabilityAddon`]: per-member add-on record in the member's hub
//!   namespace; its status conditions carry agent-reported health.
//! - [`AddonActivation`]: per-member activation record; its status carries
//!   the canonical 3-state health projection visible to fleet tooling.
//! - [`AddonRegistration`]: cluster-scoped shared registration, created once
//!   and removed only when no members remain.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::fleet::AddonSettings;
use super::types::StatusCondition;

/// Specification for a per-member add-on record
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "spyglass.dev",
    version = "v1alpha1",
    kind = "ObservabilityAddon",
    plural = "observabilityaddons",
    shortname = "obsaddon",
    status = "ObservabilityAddonStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityAddonSpec {
    /// Add-on behavior settings for this member
    #[serde(default)]
    pub addon: AddonSettings,
}

/// Status of a per-member add-on record, reported by the member agent
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityAddonStatus {
    /// Raw agent-reported conditions
    /// (Available, Progressing, Deployed, Disabled, Degraded, NotSupported)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,
}

/// Specification for a per-member activation record
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "spyglass.dev",
    version = "v1alpha1",
    kind = "AddonActivation",
    plural = "addonactivations",
    status = "AddonActivationStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AddonActivationSpec {
    /// Namespace the agent occupies on the member cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_namespace: Option<String>,
}

/// Externally visible per-member health, the canonical 3-state projection
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonActivationStatus {
    /// Projected conditions (Available, Progressing, Degraded)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,
}

/// Specification for the cluster-scoped shared add-on registration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "spyglass.dev",
    version = "v1alpha1",
    kind = "AddonRegistration",
    plural = "addonregistrations"
)]
#[serde(rename_all = "camelCase")]
pub struct AddonRegistrationSpec {
    /// Human-readable add-on name shown in fleet tooling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Short description of what the add-on provides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addon_spec_round_trips_through_json() {
        let spec = ObservabilityAddonSpec {
            addon: AddonSettings {
                enable_metrics: true,
                interval: 60,
            },
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["addon"]["interval"], 60);

        let back: ObservabilityAddonSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn activation_status_defaults_to_no_conditions() {
        let status = AddonActivationStatus::default();
        assert!(status.conditions.is_empty());
        // Empty condition lists are elided entirely on the wire
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("conditions").is_none());
    }
}
