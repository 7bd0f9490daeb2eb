//! Custom Resource Definitions for Spyglass
//!
//! This module contains all CRD definitions used by the operator. These are
//! plain data containers; all behavior lives in [`crate::controller`] and
//! [`crate::certs`].

mod addon;
mod bundle;
mod fleet;
mod placement;
mod types;

pub use addon::{
    AddonActivation, AddonActivationSpec, AddonActivationStatus, AddonRegistration,
    AddonRegistrationSpec, ObservabilityAddon, ObservabilityAddonSpec, ObservabilityAddonStatus,
};
pub use bundle::{WorkBundle, WorkBundleSpec};
pub use fleet::{AddonSettings, ObservabilityFleet, ObservabilityFleetSpec};
pub use placement::{Placement, PlacementDecision, PlacementSpec, PlacementStatus};
pub use types::{ConditionStatus, StatusCondition};
