//! Spyglass - fleet observability add-on operator
//!
//! Spyglass runs on a hub cluster and converges an observability add-on
//! across a dynamic fleet of member clusters. An external placement decision
//! list selects the members; for each selected member the operator deploys a
//! bundle of declarative objects (role binding, add-on record, work bundle,
//! activation record) and keeps it up to date, tearing everything down when
//! a member leaves the fleet. The operator also owns the public-key
//! infrastructure securing hub-member traffic: two self-signed authorities
//! and the leaf certificates signed by them.
//!
//! # Architecture
//!
//! All triggering events (placement changes, add-on status updates, bundle
//! edits, certificate rotations) coalesce onto a single logical work item,
//! so at most one convergence pass runs at a time. Passes are stateless:
//! every pass re-reads the store, re-renders the desired bundles, and
//! re-applies the difference, which makes at-least-once event delivery safe.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (ObservabilityFleet, Placement, etc.)
//! - [`controller`] - Convergence engine, status aggregation, event dispatch
//! - [`certs`] - Certificate authority bootstrap, leaf issuance, rotation
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod certs;
pub mod controller;
pub mod crd;
pub mod error;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Protocol Constants
// =============================================================================
// These values are part of the on-store contract: the ownership label scopes
// every list/watch query, and the bundle suffix defines the canonical
// per-member bundle name. Changing them orphans previously created objects.

/// Label key marking every object created by this operator
pub const OWNER_LABEL_KEY: &str = "owner";

/// Label value marking every object created by this operator
pub const OWNER_LABEL_VALUE: &str = "multicluster-observability-operator";

/// Suffix appended to a member namespace to form its bundle name
pub const BUNDLE_NAME_SUFFIX: &str = "-observability";

/// Name of the singleton fleet resource the operator reconciles
pub const FLEET_NAME: &str = "observability";

/// Name of the placement resource consumed as the decision source
pub const PLACEMENT_NAME: &str = "observability";

/// Fixed name of the per-member add-on record and activation record
pub const ADDON_NAME: &str = "observability-addon";

/// Name of the cluster-scoped shared add-on registration
pub const REGISTRATION_NAME: &str = "observability-addon";

/// Name of the shared cluster role bound in every member namespace
pub const SHARED_ROLE_NAME: &str = "spyglass:addon:member";

/// Name of the per-member role binding
pub const ROLE_BINDING_NAME: &str = "observability-addon";

/// Namespace the add-on agent occupies on each member cluster
pub const MEMBER_NAMESPACE: &str = "spyglass-addon";

/// Default hub namespace when none is configured
pub const DEFAULT_HUB_NAMESPACE: &str = "spyglass-system";

/// Finalizer guarding fleet teardown
pub const FLEET_FINALIZER: &str = "spyglass.dev/fleet-cleanup";

/// Annotation pausing reconciliation while present on the fleet resource
pub const PAUSE_ANNOTATION: &str = "spyglass.dev/pause";

/// Default add-on agent image deployed to members
pub const DEFAULT_AGENT_IMAGE: &str = "ghcr.io/spyglass-dev/addon-agent:latest";

/// In-cluster DNS name of the hub API service
///
/// Used as the baseline server-certificate SAN and as the member-facing hub
/// endpoint when no advertised address is configured.
pub fn api_service_host(hub_namespace: &str) -> String {
    format!("spyglass-api.{hub_namespace}.svc")
}

/// Labels attached to every object this operator creates
pub fn owner_labels() -> std::collections::BTreeMap<String, String> {
    std::collections::BTreeMap::from([(OWNER_LABEL_KEY.to_string(), OWNER_LABEL_VALUE.to_string())])
}
