//! Convergence engine for the fleet observability add-on
//!
//! The controller follows the Kubernetes pattern: observe current state,
//! render desired state, apply the difference. All triggering events
//! coalesce onto the singleton fleet key (see [`watch`]), so exactly one
//! convergence pass runs at a time and every operation is idempotent under
//! at-least-once delivery.
//!
//! - [`reconcile`] / [`teardown`] - the convergence pass and the fleet
//!   deletion path
//! - [`bundle`] - renders the per-member object set
//! - [`placement`] - resolves the placement decision list into targets
//! - [`status`] - folds member health into activation records
//! - [`global`] - lifecycle of the cluster-scoped shared singletons
//! - [`store`] - store seams over the Kubernetes API
//! - [`watch`] - event predicates and the fixed-key dispatcher

pub mod bundle;
pub mod context;
pub mod global;
pub mod placement;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod watch;

pub use context::{Context, ContextBuilder};
pub use placement::{resolve_targets, MemberTarget};
pub use reconcile::{error_policy, reconcile, teardown};
pub use store::KubeStore;
