//! Global resource manager
//!
//! Two cluster-scoped singletons are shared by every member: the cluster
//! role bound in each member namespace and the add-on registration. Both
//! are created when the first target appears and torn down only when the
//! member set and all bundles are empty.
//!
//! Existence is recomputed from the store at the start of every pass
//! (query-before-create against an idempotent create); no in-process state
//! survives between passes, so restarts and multiple instances observe the
//! same truth.

use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use kube::core::ObjectMeta;
use tracing::{debug, info};

use super::store::GlobalStore;
use crate::owner_labels;
use crate::crd::{AddonRegistration, AddonRegistrationSpec};
use crate::{Error, REGISTRATION_NAME, SHARED_ROLE_NAME};

/// The shared cluster role granting member agents access to their add-on
/// records on the hub
pub fn desired_shared_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(SHARED_ROLE_NAME.to_string()),
            labels: Some(owner_labels()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["spyglass.dev".to_string()]),
            resources: Some(vec![
                "observabilityaddons".to_string(),
                "observabilityaddons/status".to_string(),
            ]),
            verbs: vec![
                "get".to_string(),
                "list".to_string(),
                "watch".to_string(),
                "update".to_string(),
                "patch".to_string(),
            ],
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// The cluster-scoped add-on registration
pub fn desired_registration() -> AddonRegistration {
    AddonRegistration {
        metadata: ObjectMeta {
            name: Some(REGISTRATION_NAME.to_string()),
            labels: Some(owner_labels()),
            ..Default::default()
        },
        spec: AddonRegistrationSpec {
            display_name: Some("Observability".to_string()),
            description: Some(
                "Collects and forwards observability data from fleet members".to_string(),
            ),
        },
    }
}

/// Ensure both shared singletons exist.
///
/// Queries the store before creating; the create itself tolerates
/// already-exists, so concurrent instances and restarts converge safely.
pub async fn ensure_global(globals: &dyn GlobalStore) -> Result<(), Error> {
    if !globals.shared_role_exists().await? {
        info!(name = SHARED_ROLE_NAME, "creating shared cluster role");
        globals.create_shared_role(&desired_shared_role()).await?;
    } else {
        debug!(name = SHARED_ROLE_NAME, "shared cluster role already exists");
    }

    if !globals.registration_exists().await? {
        info!(name = REGISTRATION_NAME, "creating add-on registration");
        globals.create_registration(&desired_registration()).await?;
    } else {
        debug!(name = REGISTRATION_NAME, "add-on registration already exists");
    }

    Ok(())
}

/// Tear down both shared singletons.
///
/// Invoked only when no bundles remain anywhere and the add-on source has
/// been deleted. A failure deleting the role aborts before the registration
/// is touched, so a later pass retries the full teardown.
pub async fn ensure_global_deleted(globals: &dyn GlobalStore) -> Result<(), Error> {
    info!("deleting shared cluster role and add-on registration");
    globals.delete_shared_role().await?;
    globals.delete_registration().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::store::MockGlobalStore;

    fn store_error() -> Error {
        Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        }))
    }

    #[tokio::test]
    async fn creates_both_singletons_when_absent() {
        let mut globals = MockGlobalStore::new();
        globals.expect_shared_role_exists().returning(|| Ok(false));
        globals
            .expect_create_shared_role()
            .withf(|role| role.metadata.name.as_deref() == Some(SHARED_ROLE_NAME))
            .times(1)
            .returning(|_| Ok(()));
        globals.expect_registration_exists().returning(|| Ok(false));
        globals
            .expect_create_registration()
            .withf(|reg| reg.metadata.name.as_deref() == Some(REGISTRATION_NAME))
            .times(1)
            .returning(|_| Ok(()));

        ensure_global(&globals).await.unwrap();
    }

    #[tokio::test]
    async fn existing_singletons_are_not_recreated() {
        let mut globals = MockGlobalStore::new();
        globals.expect_shared_role_exists().returning(|| Ok(true));
        globals.expect_registration_exists().returning(|| Ok(true));
        // No create expectations: a create call would panic the test

        ensure_global(&globals).await.unwrap();
    }

    #[tokio::test]
    async fn role_deletion_failure_leaves_registration_untouched() {
        let mut globals = MockGlobalStore::new();
        globals
            .expect_delete_shared_role()
            .times(1)
            .returning(|| Err(store_error()));
        // No expect_delete_registration: reaching it would panic the test

        let result = ensure_global_deleted(&globals).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn teardown_deletes_both_singletons() {
        let mut globals = MockGlobalStore::new();
        globals
            .expect_delete_shared_role()
            .times(1)
            .returning(|| Ok(()));
        globals
            .expect_delete_registration()
            .times(1)
            .returning(|| Ok(()));

        ensure_global_deleted(&globals).await.unwrap();
    }

    #[test]
    fn shared_role_grants_addon_record_access() {
        let role = desired_shared_role();
        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0]
            .resources
            .as_ref()
            .unwrap()
            .contains(&"observabilityaddons/status".to_string()));
    }
}
