//! Controllers for the tenancy hierarchy
//!
//! One generic reconciler drives both levels. Each pass observes the
//! resource, ensures its boundary namespace, mirrors the registry credential
//! and creates the level's service identities, then reports readiness.
//! Deletion is gated by a finalizer so the boundary is always torn down
//! before the resource disappears.

pub mod boundary;
pub mod credentials;
pub mod finalizer;
pub mod reconciler;
pub mod resource;
pub mod runner;
pub mod status;
pub mod store;


pub use boundary::{BoundaryProvisioner, BoundaryState, BoundaryStore, KubeBoundaryStore};
pub use credentials::{
    CredentialPropagator, CredentialStore, IdentityStore, KubeCredentialStore, KubeIdentityStore,
};
pub use reconciler::{plan, reconcile_key, Context, ContextBuilder, Phase};
pub use resource::{HierarchyResource, IdentityRole};
pub use runner::{error_policy, reconcile, run_controller};
pub use store::{HierarchyStore, KubeHierarchyStore};
