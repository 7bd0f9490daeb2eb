//! Store seams for the convergence engine
//!
//! The declarative object store (the Kubernetes API) is an external
//! collaborator. The engine reaches it only through the thin CRUD traits
//! defined here, which keeps every pass testable with mock stores while
//! [`KubeStore`] supplies the real implementation in production.
//!
//! Conventions shared by all implementations:
//! - `get_*` returns `Ok(None)` on not-found; not-found is an absence
//!   signal, never an error.
//! - `create_*` treats already-exists as success, so re-running a pass
//!   against converged state is a no-op.
//! - `delete_*` tolerates not-found for the same reason.
//! - `update_*` sends the object as-is; callers carry the stored resource
//!   version for optimistic concurrency.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::rbac::v1::{ClusterRole, RoleBinding};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{
    AddonActivation, AddonRegistration, ObservabilityAddon, Placement, StatusCondition, WorkBundle,
};
use crate::{Error, OWNER_LABEL_KEY, OWNER_LABEL_VALUE, PLACEMENT_NAME, REGISTRATION_NAME,
    ROLE_BINDING_NAME, SHARED_ROLE_NAME};

/// Read access to the externally supplied placement decision source
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlacementStore: Send + Sync {
    /// Fetch the placement resource, or `None` if it does not exist
    async fn get_placement(&self) -> Result<Option<Placement>, Error>;
}

/// Per-member resources: add-on records, activation records, role bindings
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// List all add-on records carrying the ownership label
    async fn list_addons(&self) -> Result<Vec<ObservabilityAddon>, Error>;

    /// Fetch the add-on record in the given member namespace
    async fn get_addon(&self, namespace: &str) -> Result<Option<ObservabilityAddon>, Error>;

    /// Create an add-on record (already-exists is success)
    async fn create_addon(&self, addon: &ObservabilityAddon) -> Result<(), Error>;

    /// Delete the add-on record in the given member namespace
    async fn delete_addon(&self, namespace: &str) -> Result<(), Error>;

    /// Fetch the activation record in the given member namespace
    async fn get_activation(&self, namespace: &str) -> Result<Option<AddonActivation>, Error>;

    /// Create an activation record (already-exists is success)
    async fn create_activation(&self, activation: &AddonActivation) -> Result<(), Error>;

    /// Delete the activation record in the given member namespace
    async fn delete_activation(&self, namespace: &str) -> Result<(), Error>;

    /// Replace the projected conditions on an activation record's status
    async fn update_activation_status(
        &self,
        namespace: &str,
        conditions: &[StatusCondition],
    ) -> Result<(), Error>;

    /// Fetch the per-member role binding in the given member namespace
    async fn get_role_binding(&self, namespace: &str) -> Result<Option<RoleBinding>, Error>;

    /// Create a per-member role binding (already-exists is success)
    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<(), Error>;

    /// Delete the per-member role binding in the given member namespace
    async fn delete_role_binding(&self, namespace: &str) -> Result<(), Error>;
}

/// Per-member work bundles
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// List all work bundles carrying the ownership label
    async fn list_bundles(&self) -> Result<Vec<WorkBundle>, Error>;

    /// Fetch a work bundle by name and namespace
    async fn get_bundle(&self, name: &str, namespace: &str)
        -> Result<Option<WorkBundle>, Error>;

    /// Create a work bundle (already-exists is success)
    async fn create_bundle(&self, bundle: &WorkBundle) -> Result<(), Error>;

    /// Replace a work bundle; the bundle must carry the stored resource
    /// version for conflict detection
    async fn update_bundle(&self, bundle: &WorkBundle) -> Result<(), Error>;

    /// Delete a work bundle by name and namespace
    async fn delete_bundle(&self, name: &str, namespace: &str) -> Result<(), Error>;
}

/// Cluster-scoped shared singletons: the shared role and the registration
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GlobalStore: Send + Sync {
    /// Whether the shared cluster role exists in the store
    async fn shared_role_exists(&self) -> Result<bool, Error>;

    /// Create the shared cluster role (already-exists is success)
    async fn create_shared_role(&self, role: &ClusterRole) -> Result<(), Error>;

    /// Delete the shared cluster role (not-found is success)
    async fn delete_shared_role(&self) -> Result<(), Error>;

    /// Whether the add-on registration exists in the store
    async fn registration_exists(&self) -> Result<bool, Error>;

    /// Create the add-on registration (already-exists is success)
    async fn create_registration(&self, registration: &AddonRegistration) -> Result<(), Error>;

    /// Delete the add-on registration (not-found is success)
    async fn delete_registration(&self) -> Result<(), Error>;
}

/// Secrets in the hub namespace: pull secret and certificate material
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret from the hub namespace
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, Error>;

    /// Create a secret in the hub namespace
    async fn create_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Replace a secret in the hub namespace
    async fn update_secret(&self, secret: &Secret) -> Result<(), Error>;
}

/// Returns true if the error is a not-found response from the store
fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Returns true if the error is an already-exists conflict from the store
fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Label selector scoping every list to objects this operator owns
fn owner_selector() -> String {
    format!("{OWNER_LABEL_KEY}={OWNER_LABEL_VALUE}")
}

/// Real store implementation over the Kubernetes API
///
/// One instance implements all five seams; [`super::ContextBuilder`] wires
/// it in by default.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    hub_namespace: String,
}

impl KubeStore {
    /// Create a new KubeStore for the given hub namespace
    pub fn new(client: Client, hub_namespace: impl Into<String>) -> Self {
        Self {
            client,
            hub_namespace: hub_namespace.into(),
        }
    }

    async fn create_ignoring_conflict<K>(&self, api: &Api<K>, obj: &K) -> Result<(), Error>
    where
        K: Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        match api.create(&PostParams::default(), obj).await {
            Ok(_) => Ok(()),
            Err(e) if is_already_exists(&e) => {
                debug!("object already exists, nothing to create");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_ignoring_missing<K>(&self, api: &Api<K>, name: &str) -> Result<(), Error>
    where
        K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PlacementStore for KubeStore {
    async fn get_placement(&self) -> Result<Option<Placement>, Error> {
        let api: Api<Placement> = Api::namespaced(self.client.clone(), &self.hub_namespace);
        Ok(api.get_opt(PLACEMENT_NAME).await?)
    }
}

#[async_trait]
impl MemberStore for KubeStore {
    async fn list_addons(&self) -> Result<Vec<ObservabilityAddon>, Error> {
        let api: Api<ObservabilityAddon> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default().labels(&owner_selector()))
            .await?;
        Ok(list.items)
    }

    async fn get_addon(&self, namespace: &str) -> Result<Option<ObservabilityAddon>, Error> {
        let api: Api<ObservabilityAddon> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(crate::ADDON_NAME).await?)
    }

    async fn create_addon(&self, addon: &ObservabilityAddon) -> Result<(), Error> {
        let namespace = addon.metadata.namespace.as_deref().unwrap_or_default();
        let api: Api<ObservabilityAddon> = Api::namespaced(self.client.clone(), namespace);
        self.create_ignoring_conflict(&api, addon).await
    }

    async fn delete_addon(&self, namespace: &str) -> Result<(), Error> {
        let api: Api<ObservabilityAddon> = Api::namespaced(self.client.clone(), namespace);
        self.delete_ignoring_missing(&api, crate::ADDON_NAME).await
    }

    async fn get_activation(&self, namespace: &str) -> Result<Option<AddonActivation>, Error> {
        let api: Api<AddonActivation> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(crate::ADDON_NAME).await?)
    }

    async fn create_activation(&self, activation: &AddonActivation) -> Result<(), Error> {
        let namespace = activation.metadata.namespace.as_deref().unwrap_or_default();
        let api: Api<AddonActivation> = Api::namespaced(self.client.clone(), namespace);
        self.create_ignoring_conflict(&api, activation).await
    }

    async fn delete_activation(&self, namespace: &str) -> Result<(), Error> {
        let api: Api<AddonActivation> = Api::namespaced(self.client.clone(), namespace);
        self.delete_ignoring_missing(&api, crate::ADDON_NAME).await
    }

    async fn update_activation_status(
        &self,
        namespace: &str,
        conditions: &[StatusCondition],
    ) -> Result<(), Error> {
        let api: Api<AddonActivation> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({
            "status": { "conditions": conditions }
        });
        api.patch_status(
            crate::ADDON_NAME,
            &PatchParams::default(),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }

    async fn get_role_binding(&self, namespace: &str) -> Result<Option<RoleBinding>, Error> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(ROLE_BINDING_NAME).await?)
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<(), Error> {
        let namespace = binding.metadata.namespace.as_deref().unwrap_or_default();
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        self.create_ignoring_conflict(&api, binding).await
    }

    async fn delete_role_binding(&self, namespace: &str) -> Result<(), Error> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        self.delete_ignoring_missing(&api, ROLE_BINDING_NAME).await
    }
}

#[async_trait]
impl WorkStore for KubeStore {
    async fn list_bundles(&self) -> Result<Vec<WorkBundle>, Error> {
        let api: Api<WorkBundle> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default().labels(&owner_selector()))
            .await?;
        Ok(list.items)
    }

    async fn get_bundle(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<WorkBundle>, Error> {
        let api: Api<WorkBundle> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_bundle(&self, bundle: &WorkBundle) -> Result<(), Error> {
        let namespace = bundle.metadata.namespace.as_deref().unwrap_or_default();
        let api: Api<WorkBundle> = Api::namespaced(self.client.clone(), namespace);
        self.create_ignoring_conflict(&api, bundle).await
    }

    async fn update_bundle(&self, bundle: &WorkBundle) -> Result<(), Error> {
        let namespace = bundle.metadata.namespace.as_deref().unwrap_or_default();
        let name = bundle.metadata.name.as_deref().unwrap_or_default();
        let api: Api<WorkBundle> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), bundle).await?;
        Ok(())
    }

    async fn delete_bundle(&self, name: &str, namespace: &str) -> Result<(), Error> {
        let api: Api<WorkBundle> = Api::namespaced(self.client.clone(), namespace);
        self.delete_ignoring_missing(&api, name).await
    }
}

#[async_trait]
impl GlobalStore for KubeStore {
    async fn shared_role_exists(&self) -> Result<bool, Error> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        Ok(api.get_opt(SHARED_ROLE_NAME).await?.is_some())
    }

    async fn create_shared_role(&self, role: &ClusterRole) -> Result<(), Error> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        self.create_ignoring_conflict(&api, role).await
    }

    async fn delete_shared_role(&self) -> Result<(), Error> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        self.delete_ignoring_missing(&api, SHARED_ROLE_NAME).await
    }

    async fn registration_exists(&self) -> Result<bool, Error> {
        let api: Api<AddonRegistration> = Api::all(self.client.clone());
        Ok(api.get_opt(REGISTRATION_NAME).await?.is_some())
    }

    async fn create_registration(&self, registration: &AddonRegistration) -> Result<(), Error> {
        let api: Api<AddonRegistration> = Api::all(self.client.clone());
        self.create_ignoring_conflict(&api, registration).await
    }

    async fn delete_registration(&self) -> Result<(), Error> {
        let api: Api<AddonRegistration> = Api::all(self.client.clone());
        self.delete_ignoring_missing(&api, REGISTRATION_NAME).await
    }
}

#[async_trait]
impl SecretStore for KubeStore {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.hub_namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.hub_namespace);
        self.create_ignoring_conflict(&api, secret).await
    }

    async fn update_secret(&self, secret: &Secret) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.hub_namespace);
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        api.replace(name, &PostParams::default(), secret).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test error".to_string(),
            reason: "TestReason".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_detection_only_matches_404() {
        assert!(is_not_found(&api_error(404)));
        assert!(!is_not_found(&api_error(409)));
        assert!(!is_not_found(&api_error(500)));
    }

    #[test]
    fn already_exists_detection_only_matches_409() {
        assert!(is_already_exists(&api_error(409)));
        assert!(!is_already_exists(&api_error(404)));
        assert!(!is_already_exists(&api_error(500)));
    }

    #[test]
    fn owner_selector_uses_protocol_label() {
        assert_eq!(owner_selector(), "owner=multicluster-observability-operator");
    }
}
