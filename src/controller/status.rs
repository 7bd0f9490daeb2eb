//! Status aggregation
//!
//! Folds the raw per-member add-on conditions reported by agents into the
//! canonical 3-state projection (`Available`, `Progressing`, `Degraded`)
//! and writes it to the member's activation record, but only when the
//! projected list differs structurally from what is already stored.

use tracing::{debug, info, warn};

use super::store::MemberStore;
use crate::crd::{ObservabilityAddon, StatusCondition};
use crate::Error;
use kube::ResourceExt;

/// Canonical projection from agent-reported condition types to the 3-state
/// health model. This mapping is part of the external contract.
const PROJECTION: [(&str, &str); 6] = [
    ("Available", "Available"),
    ("Progressing", "Progressing"),
    ("Deployed", "Progressing"),
    ("Disabled", "Degraded"),
    ("Degraded", "Degraded"),
    ("NotSupported", "Degraded"),
];

/// Project a raw condition type onto the canonical model, or `None` for
/// types outside the contract
fn project_type(type_: &str) -> Option<&'static str> {
    PROJECTION
        .iter()
        .find(|(raw, _)| *raw == type_)
        .map(|(_, canonical)| *canonical)
}

/// Translate a raw condition list through the projection table.
///
/// Status, reason, message, and transition time pass through untouched;
/// only the type changes. Conditions with types outside the table are
/// dropped with a warning; the canonical model cannot represent them.
pub fn project_conditions(conditions: &[StatusCondition]) -> Vec<StatusCondition> {
    let mut projected = Vec::with_capacity(conditions.len());
    for condition in conditions {
        match project_type(&condition.type_) {
            Some(canonical) => projected.push(StatusCondition {
                type_: canonical.to_string(),
                ..condition.clone()
            }),
            None => warn!(
                condition_type = %condition.type_,
                "dropping condition with type outside the projection table"
            ),
        }
    }
    projected
}

/// Fold every member's add-on conditions into its activation record.
///
/// Members with no conditions are skipped. A missing activation record is
/// benign (the member may have been removed concurrently) and skips to the
/// next member; any other store error aborts the aggregation.
pub async fn aggregate_status(
    members: &dyn MemberStore,
    addons: &[ObservabilityAddon],
) -> Result<(), Error> {
    for addon in addons {
        let conditions = addon
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        if conditions.is_empty() {
            continue;
        }

        let projected = project_conditions(conditions);
        if projected.is_empty() {
            continue;
        }

        let namespace = addon.namespace().unwrap_or_default();
        let activation = match members.get_activation(&namespace).await? {
            Some(activation) => activation,
            None => {
                info!(namespace = %namespace, "activation record does not exist, skipping");
                continue;
            }
        };

        let stored = activation
            .status
            .map(|s| s.conditions)
            .unwrap_or_default();
        if stored == projected {
            debug!(namespace = %namespace, "activation status already up to date");
            continue;
        }

        members
            .update_activation_status(&namespace, &projected)
            .await?;
        info!(namespace = %namespace, "updated activation status");
    }
    Ok(())
}
