//! Shared context for convergence passes
//!
//! The context holds the store seams and hub configuration shared across
//! all reconciliation calls. Use [`Context::builder`] to construct
//! instances; every seam defaults to the real [`KubeStore`] and can be
//! overridden individually (primarily for tests).

use std::sync::Arc;

use kube::Client;

use super::store::{
    GlobalStore, KubeStore, MemberStore, PlacementStore, SecretStore, WorkStore,
};
use crate::DEFAULT_HUB_NAMESPACE;

/// Controller context containing store seams and hub configuration
pub struct Context {
    /// Placement decision source
    pub placements: Arc<dyn PlacementStore>,
    /// Per-member resources (add-on records, activations, role bindings)
    pub members: Arc<dyn MemberStore>,
    /// Per-member work bundles
    pub works: Arc<dyn WorkStore>,
    /// Cluster-scoped shared singletons
    pub globals: Arc<dyn GlobalStore>,
    /// Hub-namespace secrets (pull secret, certificate material)
    pub secrets: Arc<dyn SecretStore>,
    /// Namespace the operator and its secrets live in
    pub hub_namespace: String,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom store seams
    #[cfg(test)]
    pub fn for_testing(
        placements: Arc<dyn PlacementStore>,
        members: Arc<dyn MemberStore>,
        works: Arc<dyn WorkStore>,
        globals: Arc<dyn GlobalStore>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            placements,
            members,
            works,
            globals,
            secrets,
            hub_namespace: DEFAULT_HUB_NAMESPACE.to_string(),
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .hub_namespace("spyglass-system")
///     .build();
/// ```
pub struct ContextBuilder {
    client: Client,
    hub_namespace: String,
    placements: Option<Arc<dyn PlacementStore>>,
    members: Option<Arc<dyn MemberStore>>,
    works: Option<Arc<dyn WorkStore>>,
    globals: Option<Arc<dyn GlobalStore>>,
    secrets: Option<Arc<dyn SecretStore>>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            hub_namespace: DEFAULT_HUB_NAMESPACE.to_string(),
            placements: None,
            members: None,
            works: None,
            globals: None,
            secrets: None,
        }
    }

    /// Set the hub namespace
    pub fn hub_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.hub_namespace = namespace.into();
        self
    }

    /// Override the placement store (primarily for testing)
    pub fn placement_store(mut self, store: Arc<dyn PlacementStore>) -> Self {
        self.placements = Some(store);
        self
    }

    /// Override the member store (primarily for testing)
    pub fn member_store(mut self, store: Arc<dyn MemberStore>) -> Self {
        self.members = Some(store);
        self
    }

    /// Override the work store (primarily for testing)
    pub fn work_store(mut self, store: Arc<dyn WorkStore>) -> Self {
        self.works = Some(store);
        self
    }

    /// Override the global store (primarily for testing)
    pub fn global_store(mut self, store: Arc<dyn GlobalStore>) -> Self {
        self.globals = Some(store);
        self
    }

    /// Override the secret store (primarily for testing)
    pub fn secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(store);
        self
    }

    /// Build the Context, defaulting every seam to [`KubeStore`]
    pub fn build(self) -> Context {
        let default = Arc::new(KubeStore::new(self.client.clone(), self.hub_namespace.clone()));
        Context {
            placements: self.placements.unwrap_or_else(|| default.clone()),
            members: self.members.unwrap_or_else(|| default.clone()),
            works: self.works.unwrap_or_else(|| default.clone()),
            globals: self.globals.unwrap_or_else(|| default.clone()),
            secrets: self.secrets.unwrap_or_else(|| default.clone()),
            hub_namespace: self.hub_namespace,
        }
    }
}
