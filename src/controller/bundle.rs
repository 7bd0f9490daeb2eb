//! Resource bundle builder
//!
//! Given a member target and the fleet specification, renders the complete
//! declarative object set that must exist for that member: the hub-side
//! role binding, add-on record, and activation record, plus the work bundle
//! whose manifests are applied on the member cluster itself.
//!
//! The work bundle carries a fixed, ordered manifest list. With an image
//! pull secret configured and present the list has [`MANIFEST_COUNT`]
//! entries; without one it shrinks by exactly one entry.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::ByteString;
use kube::core::ObjectMeta;
use serde_json::{json, Value};

use super::placement::MemberTarget;
use crate::certs::{CA_CRT, TLS_CRT, TLS_KEY};
use crate::crd::{
    AddonActivation, AddonActivationSpec, ObservabilityAddon, ObservabilityAddonSpec,
    ObservabilityFleet, WorkBundle, WorkBundleSpec,
};
use crate::{
    owner_labels, Error, ADDON_NAME, BUNDLE_NAME_SUFFIX, MEMBER_NAMESPACE, ROLE_BINDING_NAME,
    SHARED_ROLE_NAME,
};

/// Number of manifests in a work bundle when the pull secret is present
pub const MANIFEST_COUNT: usize = 9;

/// Name used for the agent's namespace-scoped member objects
const AGENT_NAME: &str = "spyglass-addon-agent";

/// Name of the member-side cluster role granted to the agent
const AGENT_CLUSTER_ROLE: &str = "spyglass:addon:agent";

/// Name of the member-side secret telling the agent where the hub is
const HUB_INFO_SECRET: &str = "hub-info-secret";

/// Name of the member-side secret holding the agent's certificates
const MEMBER_CERTS_NAME: &str = "observability-managed-cluster-certs";

/// The full declarative object set for one member
pub struct DesiredBundle {
    /// Hub-side add-on record in the member namespace
    pub addon: ObservabilityAddon,
    /// Hub-side role binding granting the member agent store access
    pub role_binding: RoleBinding,
    /// Work bundle applied on the member cluster
    pub work: WorkBundle,
    /// Hub-side activation record in the member namespace
    pub activation: AddonActivation,
}

/// Inputs shared by every bundle built within one pass
pub struct BundleParts<'a> {
    /// The fleet specification
    pub fleet: &'a ObservabilityFleet,
    /// Hub namespace (for the advertised endpoint fallback)
    pub hub_namespace: &'a str,
    /// Image pull secret, when configured and present
    pub pull_secret: Option<&'a Secret>,
    /// Server authority secret supplying the member trust anchor
    pub server_ca: &'a Secret,
    /// Member leaf secret supplying the agent's client certificate
    pub member_certs: &'a Secret,
}

/// Canonical bundle name for a member namespace
pub fn bundle_name(namespace: &str) -> String {
    format!("{namespace}{BUNDLE_NAME_SUFFIX}")
}

/// Whether a stored bundle name matches the canonical convention.
///
/// Anything else under the ownership label is corrupt and must be deleted
/// regardless of membership.
pub fn is_canonical_bundle_name(name: &str, namespace: &str) -> bool {
    name == bundle_name(namespace)
}

/// Build the complete desired object set for one member
pub fn build_bundle(
    target: &MemberTarget,
    parts: &BundleParts<'_>,
) -> Result<DesiredBundle, Error> {
    let mut manifests = vec![
        namespace_manifest(),
        service_account_manifest(),
        cluster_role_manifest(),
        cluster_role_binding_manifest(),
        deployment_manifest(parts.fleet),
        addon_manifest(parts.fleet)?,
        hub_info_manifest(target, parts),
        member_certs_manifest(parts.server_ca, parts.member_certs)?,
    ];
    if let Some(pull_secret) = parts.pull_secret {
        manifests.push(pull_secret_manifest(pull_secret)?);
    }

    let work = WorkBundle {
        metadata: ObjectMeta {
            name: Some(bundle_name(&target.namespace)),
            namespace: Some(target.namespace.clone()),
            labels: Some(owner_labels()),
            ..Default::default()
        },
        spec: WorkBundleSpec { manifests },
    };

    let addon = ObservabilityAddon {
        metadata: ObjectMeta {
            name: Some(ADDON_NAME.to_string()),
            namespace: Some(target.namespace.clone()),
            labels: Some(owner_labels()),
            ..Default::default()
        },
        spec: ObservabilityAddonSpec {
            addon: parts.fleet.spec.addon.clone(),
        },
        status: None,
    };

    let role_binding = RoleBinding {
        metadata: ObjectMeta {
            name: Some(ROLE_BINDING_NAME.to_string()),
            namespace: Some(target.namespace.clone()),
            labels: Some(owner_labels()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: SHARED_ROLE_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            kind: "Group".to_string(),
            name: format!("system:spyglass:addon:{}", target.name),
            namespace: None,
        }]),
    };

    let activation = AddonActivation {
        metadata: ObjectMeta {
            name: Some(ADDON_NAME.to_string()),
            namespace: Some(target.namespace.clone()),
            labels: Some(owner_labels()),
            ..Default::default()
        },
        spec: AddonActivationSpec {
            install_namespace: Some(MEMBER_NAMESPACE.to_string()),
        },
        status: None,
    };

    Ok(DesiredBundle {
        addon,
        role_binding,
        work,
        activation,
    })
}

fn namespace_manifest() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": MEMBER_NAMESPACE }
    })
}

fn service_account_manifest() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ServiceAccount",
        "metadata": { "name": AGENT_NAME, "namespace": MEMBER_NAMESPACE }
    })
}

fn cluster_role_manifest() -> Value {
    json!({
        "apiVersion": "rbac.authorization.k8s.io/v1",
        "kind": "ClusterRole",
        "metadata": { "name": AGENT_CLUSTER_ROLE },
        "rules": [
            {
                "apiGroups": [""],
                "resources": ["pods", "nodes", "namespaces", "services", "endpoints"],
                "verbs": ["get", "list", "watch"]
            },
            {
                "apiGroups": ["apps"],
                "resources": ["deployments", "daemonsets", "statefulsets"],
                "verbs": ["get", "list", "watch"]
            }
        ]
    })
}

fn cluster_role_binding_manifest() -> Value {
    json!({
        "apiVersion": "rbac.authorization.k8s.io/v1",
        "kind": "ClusterRoleBinding",
        "metadata": { "name": AGENT_CLUSTER_ROLE },
        "roleRef": {
            "apiGroup": "rbac.authorization.k8s.io",
            "kind": "ClusterRole",
            "name": AGENT_CLUSTER_ROLE
        },
        "subjects": [
            { "kind": "ServiceAccount", "name": AGENT_NAME, "namespace": MEMBER_NAMESPACE }
        ]
    })
}

fn deployment_manifest(fleet: &ObservabilityFleet) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": AGENT_NAME,
            "namespace": MEMBER_NAMESPACE,
            "labels": { "app": AGENT_NAME }
        },
        "spec": {
            "replicas": 1,
            "selector": { "matchLabels": { "app": AGENT_NAME } },
            "template": {
                "metadata": { "labels": { "app": AGENT_NAME } },
                "spec": {
                    "serviceAccountName": AGENT_NAME,
                    "containers": [{
                        "name": "addon-agent",
                        "image": fleet.agent_image(),
                        "args": [
                            format!("--interval={}", fleet.spec.addon.interval),
                            format!("--hub-info-secret={HUB_INFO_SECRET}"),
                        ],
                        "volumeMounts": [{
                            "name": "certs",
                            "mountPath": "/var/run/spyglass/certs",
                            "readOnly": true
                        }]
                    }],
                    "volumes": [{
                        "name": "certs",
                        "secret": { "secretName": MEMBER_CERTS_NAME }
                    }]
                }
            }
        }
    })
}

fn addon_manifest(fleet: &ObservabilityFleet) -> Result<Value, Error> {
    let spec = ObservabilityAddonSpec {
        addon: fleet.spec.addon.clone(),
    };
    Ok(json!({
        "apiVersion": "spyglass.dev/v1alpha1",
        "kind": "ObservabilityAddon",
        "metadata": { "name": ADDON_NAME, "namespace": MEMBER_NAMESPACE },
        "spec": serde_json::to_value(&spec)
            .map_err(|e| Error::serialization(e.to_string()))?
    }))
}

fn hub_info_manifest(target: &MemberTarget, parts: &BundleParts<'_>) -> Value {
    let endpoint = parts
        .fleet
        .spec
        .advertised_address
        .clone()
        .unwrap_or_else(|| crate::api_service_host(parts.hub_namespace));
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": HUB_INFO_SECRET, "namespace": MEMBER_NAMESPACE },
        "stringData": {
            "cluster-name": target.name,
            "endpoint": endpoint
        }
    })
}

fn member_certs_manifest(server_ca: &Secret, member_certs: &Secret) -> Result<Value, Error> {
    let data = BTreeMap::from([
        (CA_CRT.to_string(), secret_bytes(server_ca, CA_CRT)?.clone()),
        (TLS_CRT.to_string(), secret_bytes(member_certs, TLS_CRT)?.clone()),
        (TLS_KEY.to_string(), secret_bytes(member_certs, TLS_KEY)?.clone()),
    ]);
    Ok(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": MEMBER_CERTS_NAME, "namespace": MEMBER_NAMESPACE },
        "data": serde_json::to_value(&data)
            .map_err(|e| Error::serialization(e.to_string()))?
    }))
}

fn pull_secret_manifest(source: &Secret) -> Result<Value, Error> {
    let name = source.metadata.name.as_deref().unwrap_or_default();
    let mut manifest = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": MEMBER_NAMESPACE },
        "data": serde_json::to_value(&source.data)
            .map_err(|e| Error::serialization(e.to_string()))?
    });
    if let Some(type_) = &source.type_ {
        manifest["type"] = Value::String(type_.clone());
    }
    Ok(manifest)
}

fn secret_bytes<'a>(secret: &'a Secret, field: &str) -> Result<&'a ByteString, Error> {
    let name = secret.metadata.name.as_deref().unwrap_or_default();
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(field))
        .ok_or_else(|| Error::pki(format!("secret {name} is missing field {field}")))
}
