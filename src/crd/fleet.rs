//! ObservabilityFleet Custom Resource Definition
//!
//! The singleton fleet resource is the add-on source: it declares the
//! desired add-on specification for every selected member. Deleting it
//! tears the whole deployment down.

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::PAUSE_ANNOTATION;

/// Specification for the fleet-wide observability add-on
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "spyglass.dev",
    version = "v1alpha1",
    kind = "ObservabilityFleet",
    plural = "observabilityfleets",
    shortname = "obsfleet",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityFleetSpec {
    /// Name of the image pull secret in the hub namespace, copied into each
    /// member bundle when present. Absence is not an error: bundles simply
    /// omit the pull-secret manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,

    /// Externally reachable hub address, added to the server certificate
    /// SANs and advertised to members. When unset, members are pointed at
    /// the in-cluster API service only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertised_address: Option<String>,

    /// Add-on agent image deployed to members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addon_agent_image: Option<String>,

    /// Add-on behavior settings propagated to every member
    #[serde(default)]
    pub addon: AddonSettings,
}

/// Add-on behavior settings propagated to every member
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonSettings {
    /// Whether the member agent collects and forwards metrics
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,

    /// Collection interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u32,
}

fn default_enable_metrics() -> bool {
    true
}

fn default_interval() -> u32 {
    300
}

impl Default for AddonSettings {
    fn default() -> Self {
        Self {
            enable_metrics: default_enable_metrics(),
            interval: default_interval(),
        }
    }
}

impl ObservabilityFleet {
    /// Returns true if reconciliation is paused via annotation
    pub fn is_paused(&self) -> bool {
        self.annotations()
            .get(PAUSE_ANNOTATION)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// The agent image to deploy, falling back to the built-in default
    pub fn agent_image(&self) -> &str {
        self.spec
            .addon_agent_image
            .as_deref()
            .unwrap_or(crate::DEFAULT_AGENT_IMAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;

    fn fleet_with_annotations(pairs: &[(&str, &str)]) -> ObservabilityFleet {
        let annotations = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilityFleet {
            metadata: ObjectMeta {
                name: Some(crate::FLEET_NAME.to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: ObservabilityFleetSpec::default(),
        }
    }

    #[test]
    fn pause_annotation_is_honored() {
        assert!(fleet_with_annotations(&[(PAUSE_ANNOTATION, "true")]).is_paused());
        assert!(!fleet_with_annotations(&[(PAUSE_ANNOTATION, "false")]).is_paused());
        assert!(!fleet_with_annotations(&[]).is_paused());
    }

    #[test]
    fn addon_settings_default_to_metrics_enabled() {
        let settings = AddonSettings::default();
        assert!(settings.enable_metrics);
        assert_eq!(settings.interval, 300);
    }

    #[test]
    fn agent_image_falls_back_to_default() {
        let mut fleet = fleet_with_annotations(&[]);
        assert_eq!(fleet.agent_image(), crate::DEFAULT_AGENT_IMAGE);

        fleet.spec.addon_agent_image = Some("registry.example/agent:v2".to_string());
        assert_eq!(fleet.agent_image(), "registry.example/agent:v2");
    }
}
