//! Lattice Tenancy - maps an org/space hierarchy onto Kubernetes primitives
//!
//! Every hierarchy resource (Org, Space) is reconciled into:
//! - a Namespace acting as its isolation boundary
//! - a copy of the registry pull credential inside that Namespace
//! - the ServiceAccounts downstream build and run systems need
//!
//! Teardown is gated by a finalizer so the hierarchy object cannot disappear
//! before deletion of its Namespace has been requested.
//!
//! # Modules
//!
//! - [`crd`] - Org and Space custom resources and shared status types
//! - [`controller`] - Level-triggered reconciler and its components
//! - [`registry`] - Kind registry injected into the store adapters
//! - [`config`] - Controller configuration from flags and environment
//! - [`events`] - Kubernetes Event publishing
//! - [`telemetry`] - Logging setup
//! - [`retry`] - Backoff for startup operations
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod registry;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Well-known names
// =============================================================================

/// Finalizer held on hierarchy resources until boundary deletion is accepted
pub const FINALIZER: &str = "tenancy.lattice.dev/boundary-cleanup";

/// Field manager for server-side apply and patches
pub const FIELD_MANAGER: &str = "lattice-tenancy";

/// Label key marking objects this controller manages
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on managed objects
pub const MANAGED_BY_VALUE: &str = "lattice-tenancy";

/// Label on a boundary naming the namespace its owner lives in
pub const PARENT_NAMESPACE_LABEL: &str = "tenancy.lattice.dev/parent-namespace";

/// Annotation on a boundary carrying the owner's display name
pub const DISPLAY_NAME_ANNOTATION: &str = "tenancy.lattice.dev/display-name";

/// Label on a service identity naming the system it serves
pub const IDENTITY_ROLE_LABEL: &str = "tenancy.lattice.dev/identity-role";

/// Pod Security Admission enforcement label
pub const POD_SECURITY_ENFORCE_LABEL: &str = "pod-security.kubernetes.io/enforce";

/// Pod Security level applied to every boundary
pub const POD_SECURITY_LEVEL: &str = "restricted";
